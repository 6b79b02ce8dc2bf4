use chrono::NaiveDate;
use std::path::PathBuf;
use thiserror::Error;
use toolgate_infra::AuditQuery;

pub const USAGE: &str = "\
Usage: toolgate [--config PATH] <command>

Commands:
  audit verify                      Check the hash chain of the audit log
  audit query [--session S] [--tool T] [--limit N]
                                    Print matching entries, newest first
  audit stats [--date YYYY-MM-DD]   Summarize one day (default: today)
  audit blocked [--days N]          Approved versus blocked calls per day (default: 7)
  audit score                       Grade integrity, denial rate and high-risk volume
  audit rotate                      Start a new audit segment
  audit prune                       Delete segments past the retention period
  config check                      Validate the configuration and print it
  help                              Show this message";

const DEFAULT_BLOCKED_DAYS: u32 = 7;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum UsageError {
    #[error("missing command")]
    MissingCommand,

    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error("option {0} needs a value")]
    MissingValue(String),

    #[error("invalid value for {option}: {value}")]
    InvalidValue { option: String, value: String },

    #[error("unexpected argument: {0}")]
    Unexpected(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    AuditVerify,
    AuditQuery(AuditQuery),
    AuditStats { date: Option<NaiveDate> },
    AuditBlocked { days: u32 },
    AuditScore,
    AuditRotate,
    AuditPrune,
    ConfigCheck,
    Help,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub config: Option<PathBuf>,
    pub command: Command,
}

/// Parse arguments, not including the program name.
pub fn parse_args<I, S>(args: I) -> Result<Invocation, UsageError>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut args = args.into_iter().map(Into::into).peekable();
    let mut config = None;

    while args.peek().is_some_and(|arg| arg == "--config") {
        args.next();
        config = Some(PathBuf::from(value_for("--config", args.next())?));
    }

    let group = args.next().ok_or(UsageError::MissingCommand)?;
    let command = match group.as_str() {
        "help" | "--help" | "-h" => Command::Help,
        "audit" => {
            let action = args.next().ok_or(UsageError::MissingCommand)?;
            match action.as_str() {
                "verify" => Command::AuditVerify,
                "rotate" => Command::AuditRotate,
                "prune" => Command::AuditPrune,
                "score" => Command::AuditScore,
                "blocked" => {
                    let mut days = DEFAULT_BLOCKED_DAYS;
                    while let Some(option) = args.next() {
                        if option != "--days" {
                            return Err(UsageError::Unexpected(option));
                        }
                        let raw = value_for(&option, args.next())?;
                        days = raw.parse::<u32>().ok().filter(|d| *d > 0).ok_or_else(|| {
                            UsageError::InvalidValue {
                                option: option.clone(),
                                value: raw.clone(),
                            }
                        })?;
                    }
                    return Ok(Invocation {
                        config,
                        command: Command::AuditBlocked { days },
                    });
                }
                "query" => {
                    let mut query = AuditQuery::default();
                    while let Some(option) = args.next() {
                        match option.as_str() {
                            "--session" => query.session = Some(value_for(&option, args.next())?),
                            "--tool" => query.tool = Some(value_for(&option, args.next())?),
                            "--limit" => {
                                let raw = value_for(&option, args.next())?;
                                query.limit = Some(raw.parse().map_err(|_| {
                                    UsageError::InvalidValue {
                                        option: option.clone(),
                                        value: raw.clone(),
                                    }
                                })?);
                            }
                            _ => return Err(UsageError::Unexpected(option)),
                        }
                    }
                    return Ok(Invocation {
                        config,
                        command: Command::AuditQuery(query),
                    });
                }
                "stats" => {
                    let mut date = None;
                    while let Some(option) = args.next() {
                        if option != "--date" {
                            return Err(UsageError::Unexpected(option));
                        }
                        let raw = value_for(&option, args.next())?;
                        date = Some(NaiveDate::parse_from_str(&raw, "%Y-%m-%d").map_err(|_| {
                            UsageError::InvalidValue {
                                option: option.clone(),
                                value: raw.clone(),
                            }
                        })?);
                    }
                    return Ok(Invocation {
                        config,
                        command: Command::AuditStats { date },
                    });
                }
                other => return Err(UsageError::UnknownCommand(format!("audit {}", other))),
            }
        }
        "config" => match args.next().as_deref() {
            Some("check") => Command::ConfigCheck,
            Some(other) => return Err(UsageError::UnknownCommand(format!("config {}", other))),
            None => return Err(UsageError::MissingCommand),
        },
        other => return Err(UsageError::UnknownCommand(other.to_string())),
    };

    if let Some(extra) = args.next() {
        return Err(UsageError::Unexpected(extra));
    }
    Ok(Invocation { config, command })
}

fn value_for(option: &str, value: Option<String>) -> Result<String, UsageError> {
    value
        .filter(|v| !v.starts_with("--"))
        .ok_or_else(|| UsageError::MissingValue(option.to_string()))
}
