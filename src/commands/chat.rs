//! Interactive chat mode handler
//!
//! Runs a readline loop that sends each line through the orchestrator.
//! When a session reaches its interaction bound the loop continues in the
//! successor session. `/good` and `/bad` rate the last answer.

use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use super::special_commands::{parse_special_command, print_help, SpecialCommand};
use super::{print_envelope, resolve_session};
use crate::config::Config;
use crate::error::{Result, RouterError};
use crate::learning::Polarity;
use crate::orchestrator::Orchestrator;
use crate::session::{MessageId, SessionId, SessionStatus};

/// Start interactive chat mode
///
/// # Arguments
///
/// * `config` - Global configuration
/// * `resume` - Optional session id or prefix to continue
///
/// # Errors
///
/// Returns error if the router cannot be built or the terminal fails
pub async fn run_chat(config: &Config, resume: Option<&str>) -> Result<()> {
    let orchestrator = Orchestrator::from_config(config)?;

    let mut session_id = match resume {
        Some(prefix) => {
            let id = resolve_session(&super::open_storage(config)?, prefix)?;
            follow_rotation(&orchestrator, id)?
        }
        None => orchestrator.create_session(None)?.id,
    };
    let mut last_reply: Option<MessageId> = None;

    let mut rl = DefaultEditor::new()?;
    print_welcome_banner(session_id, orchestrator.sessions().max_interactions());

    loop {
        let prompt = format!("{} ", "pergunta>".cyan().bold());
        match rl.readline(&prompt) {
            Ok(line) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }

                let command = match parse_special_command(trimmed) {
                    Ok(command) => command,
                    Err(e) => {
                        eprintln!("{}", e.to_string().red());
                        continue;
                    }
                };

                match command {
                    SpecialCommand::Good(comment) => {
                        rate(&orchestrator, last_reply, Polarity::Positive, comment);
                        continue;
                    }
                    SpecialCommand::Bad(comment) => {
                        rate(&orchestrator, last_reply, Polarity::Negative, comment);
                        continue;
                    }
                    SpecialCommand::NewSession => {
                        session_id = orchestrator.create_session(None)?.id;
                        last_reply = None;
                        println!("{}", format!("Nova sessao {}\n", session_id).green());
                        continue;
                    }
                    SpecialCommand::ShowStatus => {
                        print_status(&orchestrator, session_id)?;
                        continue;
                    }
                    SpecialCommand::Insights => {
                        super::learning::print_insights(&orchestrator.insights()?);
                        continue;
                    }
                    SpecialCommand::Help => {
                        print_help();
                        continue;
                    }
                    SpecialCommand::Exit => break,
                    SpecialCommand::None => {}
                }

                rl.add_history_entry(trimmed)?;

                match orchestrator.handle(session_id, trimmed).await {
                    Ok(envelope) => {
                        print_envelope(&envelope);
                        println!();
                        last_reply = Some(envelope.message.id);
                        if let Some(next) = envelope.next_session {
                            session_id = next;
                        }
                    }
                    Err(e) => {
                        eprintln!("{}", format!("Erro: {}", e).red());
                        tracing::warn!("Failed to handle message: {:#}", e);
                        if matches!(
                            e.downcast_ref::<RouterError>(),
                            Some(RouterError::SessionUnavailable { .. })
                        ) {
                            session_id = follow_rotation(&orchestrator, session_id)?;
                        }
                    }
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => break,
            Err(err) => {
                eprintln!("Error: {:?}", err);
                break;
            }
        }
    }

    println!("Ate logo!");
    Ok(())
}

/// Returns the active session at the end of a rotation chain
///
/// Deleted or unknown sessions are replaced by a fresh one.
fn follow_rotation(orchestrator: &Orchestrator, start: SessionId) -> Result<SessionId> {
    let mut current = start;
    loop {
        match orchestrator.sessions().get(current)? {
            Some(session) if session.status == SessionStatus::Active => return Ok(current),
            Some(session) if session.status == SessionStatus::Rotated => match session.successor {
                Some(next) => current = next,
                None => break,
            },
            _ => break,
        }
    }

    let fresh = orchestrator.create_session(None)?.id;
    println!("{}", format!("Nova sessao {}", fresh).yellow());
    Ok(fresh)
}

fn rate(
    orchestrator: &Orchestrator,
    last_reply: Option<MessageId>,
    polarity: Polarity,
    comment: Option<String>,
) {
    let Some(message_id) = last_reply else {
        println!("{}", "Nenhuma resposta para avaliar ainda.".yellow());
        return;
    };

    match orchestrator.record_feedback(message_id, polarity, comment) {
        Ok(_) => println!("{}\n", format!("Feedback {} registrado.", polarity).green()),
        Err(e) => eprintln!("{}", format!("Falha ao registrar feedback: {}", e).red()),
    }
}

fn print_status(orchestrator: &Orchestrator, session_id: SessionId) -> Result<()> {
    match orchestrator.sessions().get(session_id)? {
        Some(session) => {
            println!("Sessao:     {}", session.id.to_string().cyan());
            println!("Titulo:     {}", session.title);
            println!(
                "Interacoes: {}/{}",
                session.interactions,
                orchestrator.sessions().max_interactions()
            );
            println!("Mensagens:  {}\n", session.messages.len());
        }
        None => println!("{}", "Sessao nao encontrada.".yellow()),
    }
    Ok(())
}

fn print_welcome_banner(session_id: SessionId, max_interactions: usize) {
    println!("{}", "Warehouse Router".bold());
    println!(
        "Sessao {} · ate {} perguntas por sessao",
        session_id.to_string().cyan(),
        max_interactions
    );
    println!("Digite /help para ver os comandos.\n");
}
