use crate::error::Error;

/// A parsed client -> server wire frame (spec.md §4.2).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClientCommand {
    Play { video_time: f64 },
    Pause { video_time: f64 },
    Suspend { video_time: f64 },
    Unsuspend { video_time: f64 },
    ChangeFile { file_ind: usize },
}

impl ClientCommand {
    /// Parses one wire frame. Unknown prefixes and malformed
    /// arguments are both reported as errors but never tear down the
    /// connection — the caller decides that (spec.md §4.2, §7).
    pub fn parse(frame: &str) -> Result<Self, Error> {
        let mut parts = frame.splitn(2, ' ');
        let prefix = parts.next().unwrap_or_default();
        let arg = parts.next().unwrap_or_default().trim();

        let parse_time = || {
            arg.parse::<f64>()
                .map_err(|_| Error::ParseFailed(format!("{prefix} expects a float, got {arg:?}")))
        };

        match prefix {
            "pl" => Ok(ClientCommand::Play {
                video_time: parse_time()?,
            }),
            "pa" => Ok(ClientCommand::Pause {
                video_time: parse_time()?,
            }),
            "sp" => Ok(ClientCommand::Suspend {
                video_time: parse_time()?,
            }),
            "up" => Ok(ClientCommand::Unsuspend {
                video_time: parse_time()?,
            }),
            "cf" => {
                let file_ind = arg.parse::<i64>().map_err(|_| {
                    Error::ParseFailed(format!("cf expects an integer, got {arg:?}"))
                })?;
                let file_ind = usize::try_from(file_ind).map_err(|_| {
                    Error::ParseFailed(format!("cf expects a non-negative integer, got {arg}"))
                })?;
                Ok(ClientCommand::ChangeFile { file_ind })
            }
            other => Err(Error::UnknownCommand(other.to_string())),
        }
    }
}
