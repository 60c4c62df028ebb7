use crate::connection::{ConnId, UserInfo};
use crate::video_status::StatusKind;

/// A server -> client wire frame (spec.md §4.2).
///
/// `Play`/`Pause`/`Suspend` reuse the `pl`/`pa`/`sp` prefixes and carry
/// the observable `video_time`; `ChangeFile` carries the file index.
/// The `uc`/`ud`/`ua` frames are advisory (join/leave/initial-sync) —
/// the core's correctness does not depend on clients understanding
/// them.
///
/// One source variant this spec is grounded on assigns the same wire
/// prefix (`"pl"`) to all three status-change server commands. This
/// implementation uses distinct prefixes per spec.md §9's redesign
/// note, since collapsing them loses the play/pause/suspend
/// distinction on the wire.
#[derive(Debug, Clone)]
pub enum ServerFrame {
    Play { video_time: f64 },
    Pause { video_time: f64 },
    Suspend { video_time: f64 },
    ChangeFile { file_ind: usize },
    UserConnected { user: UserInfo },
    UserDisconnected { conn_id: ConnId },
    UsersSync { users: Vec<UserInfo> },
}

impl ServerFrame {
    pub fn from_status(kind: StatusKind, video_time: f64) -> Self {
        match kind {
            StatusKind::Playing => ServerFrame::Play { video_time },
            StatusKind::Paused => ServerFrame::Pause { video_time },
            StatusKind::Suspended => ServerFrame::Suspend { video_time },
        }
    }

    pub fn to_wire_string(&self) -> String {
        match self {
            ServerFrame::Play { video_time } => format!("pl {video_time}"),
            ServerFrame::Pause { video_time } => format!("pa {video_time}"),
            ServerFrame::Suspend { video_time } => format!("sp {video_time}"),
            ServerFrame::ChangeFile { file_ind } => format!("cf {file_ind}"),
            ServerFrame::UserConnected { user } => {
                format!("uc {}", serde_json::to_string(user).unwrap_or_default())
            }
            ServerFrame::UserDisconnected { conn_id } => format!("ud {conn_id}"),
            ServerFrame::UsersSync { users } => {
                format!("ua {}", serde_json::to_string(users).unwrap_or_default())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::ClientCommand;

    #[test]
    fn status_round_trips_through_client_parser() {
        for frame in [
            ServerFrame::Play { video_time: 12.5 },
            ServerFrame::Pause { video_time: 0.0 },
            ServerFrame::Suspend { video_time: 7.25 },
        ] {
            let wire = frame.to_wire_string();
            let parsed = ClientCommand::parse(&wire).unwrap();
            let video_time = match parsed {
                ClientCommand::Play { video_time }
                | ClientCommand::Pause { video_time }
                | ClientCommand::Suspend { video_time } => video_time,
                other => panic!("unexpected parse {other:?}"),
            };
            let rewired = match frame {
                ServerFrame::Play { .. } => ServerFrame::Play { video_time },
                ServerFrame::Pause { .. } => ServerFrame::Pause { video_time },
                ServerFrame::Suspend { .. } => ServerFrame::Suspend { video_time },
                _ => unreachable!(),
            };
            assert_eq!(wire, rewired.to_wire_string());
        }
    }

    #[test]
    fn distinct_prefixes_for_each_status_kind() {
        assert_eq!(
            ServerFrame::Play { video_time: 0.0 }.to_wire_string(),
            "pl 0"
        );
        assert_eq!(
            ServerFrame::Pause { video_time: 0.0 }.to_wire_string(),
            "pa 0"
        );
        assert_eq!(
            ServerFrame::Suspend { video_time: 0.0 }.to_wire_string(),
            "sp 0"
        );
    }
}
