//! Special commands parser for interactive chat mode
//!
//! Special commands let the user rate the last answer, start a new
//! session, inspect the current one, ask for help or leave. Commands are
//! prefixed with `/` and are case-insensitive; `exit` and `quit` also work
//! without the slash.

use thiserror::Error;

/// Errors that can occur when parsing special commands
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// Unknown command was entered
    #[error("Unknown command: {0}\n\nType '/help' to see available commands")]
    UnknownCommand(String),

    /// Command was given an unsupported argument
    #[error("Unsupported argument for {command}: {arg}\n\nType '/help' to see valid usage")]
    UnsupportedArgument { command: String, arg: String },
}

/// Special commands that can be executed during interactive chat
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpecialCommand {
    /// Positive feedback on the last answer, with an optional comment
    Good(Option<String>),

    /// Negative feedback on the last answer, with an optional comment
    Bad(Option<String>),

    /// Start a fresh session
    NewSession,

    /// Show the current session and its interaction count
    ShowStatus,

    /// Show what the router has learned so far
    Insights,

    /// Display help information
    Help,

    /// Exit the interactive session
    Exit,

    /// Not a special command; the input is a question
    None,
}

fn comment(rest: &str) -> Option<String> {
    let rest = rest.trim();
    (!rest.is_empty()).then(|| rest.to_string())
}

/// Parse a user input string into a special command
///
/// # Errors
///
/// Returns `CommandError::UnknownCommand` if input starts with "/" but is
/// not a valid command, and `CommandError::UnsupportedArgument` if a
/// command that takes no argument receives one.
///
/// # Examples
///
/// ```
/// use warehouse_router::commands::special_commands::{parse_special_command, SpecialCommand};
///
/// let cmd = parse_special_command("/bad deveria ser SQL").unwrap();
/// assert_eq!(cmd, SpecialCommand::Bad(Some("deveria ser SQL".to_string())));
///
/// let cmd = parse_special_command("Quantos clientes temos?").unwrap();
/// assert_eq!(cmd, SpecialCommand::None);
///
/// assert!(parse_special_command("/foo").is_err());
/// ```
pub fn parse_special_command(input: &str) -> Result<SpecialCommand, CommandError> {
    let trimmed = input.trim();
    let lower = trimmed.to_lowercase();

    if !trimmed.starts_with('/') && lower != "exit" && lower != "quit" {
        return Ok(SpecialCommand::None);
    }

    let (name, rest) = match trimmed.split_once(char::is_whitespace) {
        Some((name, rest)) => (name.to_lowercase(), rest),
        None => (lower.clone(), ""),
    };

    let no_argument = |command: SpecialCommand| {
        if rest.trim().is_empty() {
            Ok(command)
        } else {
            Err(CommandError::UnsupportedArgument {
                command: name.clone(),
                arg: rest.trim().to_string(),
            })
        }
    };

    match name.as_str() {
        "/good" | "/+" | "/up" => Ok(SpecialCommand::Good(comment(rest))),
        "/bad" | "/-" | "/down" => Ok(SpecialCommand::Bad(comment(rest))),
        "/new" => no_argument(SpecialCommand::NewSession),
        "/status" | "/session" => no_argument(SpecialCommand::ShowStatus),
        "/insights" => no_argument(SpecialCommand::Insights),
        "/help" | "/?" => no_argument(SpecialCommand::Help),
        "/exit" | "/quit" | "exit" | "quit" => no_argument(SpecialCommand::Exit),
        _ => Err(CommandError::UnknownCommand(trimmed.to_string())),
    }
}

/// Print help for the chat loop
pub fn print_help() {
    println!(
        r#"
Comandos disponiveis:

  /good [comentario]   Marca a ultima resposta como correta
  /bad [comentario]    Marca a ultima resposta como errada
  /new                 Inicia uma nova sessao
  /status              Mostra a sessao atual
  /insights            Mostra o que o roteador aprendeu
  /help                Mostra esta ajuda
  /exit                Sai do chat

Qualquer outro texto e enviado como pergunta.
"#
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feedback_commands_with_and_without_comment() {
        assert_eq!(
            parse_special_command("/good").unwrap(),
            SpecialCommand::Good(None)
        );
        assert_eq!(
            parse_special_command("/BAD   errado  ").unwrap(),
            SpecialCommand::Bad(Some("errado".to_string()))
        );
        assert_eq!(
            parse_special_command("/+ perfeito").unwrap(),
            SpecialCommand::Good(Some("perfeito".to_string()))
        );
    }

    #[test]
    fn test_exit_without_slash() {
        assert_eq!(parse_special_command("quit").unwrap(), SpecialCommand::Exit);
        assert_eq!(parse_special_command("EXIT").unwrap(), SpecialCommand::Exit);
    }

    #[test]
    fn test_regular_text_is_not_a_command() {
        assert_eq!(
            parse_special_command("exit strategies for clients?").unwrap(),
            SpecialCommand::None
        );
    }

    #[test]
    fn test_argument_rejected_for_plain_commands() {
        assert_eq!(
            parse_special_command("/new agora"),
            Err(CommandError::UnsupportedArgument {
                command: "/new".to_string(),
                arg: "agora".to_string()
            })
        );
    }

    #[test]
    fn test_unknown_command() {
        assert!(matches!(
            parse_special_command("/mode write"),
            Err(CommandError::UnknownCommand(_))
        ));
    }
}
