//! Line-oriented commands for controlling playback from a terminal.

use std::{fmt, str::FromStr};

use crate::{
    error::{Error, Result},
    store::{PlaybackSession, Status},
};

#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    /// Play a station by id or name.
    Play(String),
    Toggle,
    Pause,
    Resume,
    Stop,
    Volume(f32),

    /// List stations, optionally filtered.
    List(Option<String>),
    Status,
    Help,
    Quit,
}

impl Command {
    pub const HELP: &'static str = "\
commands:
  play <id|name>   tune to a station
  toggle           play or pause
  pause | resume
  stop             stop and deselect the station
  volume <0..1>    set the volume
  list [query]     list stations
  status           show what is playing
  quit";
}

impl FromStr for Command {
    type Err = Error;

    fn from_str(line: &str) -> Result<Self> {
        let line = line.trim();
        let (verb, rest) = line
            .split_once(char::is_whitespace)
            .map_or((line, ""), |(verb, rest)| (verb, rest.trim()));
        let argument = (!rest.is_empty()).then(|| rest.to_owned());

        let command = match verb.to_ascii_lowercase().as_str() {
            "play" | "p" => Self::Play(
                argument.ok_or_else(|| Error::invalid_argument("play needs a station"))?,
            ),
            "toggle" | "t" | "" => Self::Toggle,
            "pause" => Self::Pause,
            "resume" => Self::Resume,
            "stop" | "s" => Self::Stop,
            "volume" | "vol" | "v" => {
                let volume = rest.parse::<f32>().map_err(|e| {
                    Error::invalid_argument(format!("invalid volume \"{rest}\": {e}"))
                })?;
                if !(0.0..=1.0).contains(&volume) {
                    return Err(Error::invalid_argument(format!(
                        "volume {volume} out of range 0..1"
                    )));
                }
                Self::Volume(volume)
            }
            "list" | "ls" | "l" => Self::List(argument),
            "status" | "st" => Self::Status,
            "help" | "h" | "?" => Self::Help,
            "quit" | "exit" | "q" => Self::Quit,
            other => {
                return Err(Error::invalid_argument(format!(
                    "unknown command \"{other}\", try \"help\""
                )))
            }
        };

        Ok(command)
    }
}

/// One-line summary of a session.
pub struct Summary<'a>(pub &'a PlaybackSession);

impl fmt::Display for Summary<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let session = self.0;
        let Some(station) = &session.station else {
            return write!(f, "stopped");
        };

        match session.status {
            Status::Idle => write!(f, "{station}: idle")?,
            Status::Loading { candidate: 0, .. } => write!(f, "{station}: tuning")?,
            Status::Loading { candidate, of } => {
                write!(f, "{station}: tuning (stream {candidate} of {of})")?;
            }
            Status::Playing => write!(f, "playing {station}")?,
            Status::Paused => write!(f, "{station}: paused")?,
            Status::Reconnecting { attempt } => {
                write!(f, "{station}: reconnecting (attempt {attempt})")?;
            }
            Status::Failed => match &session.error {
                Some(error) => write!(f, "{error}")?,
                None => write!(f, "{station}: failed")?,
            },
        }

        write!(f, " [volume {:.0}%]", session.volume * 100.0)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{error::PlaybackError, station::Station};

    #[test]
    fn parses_commands() {
        assert_eq!(
            "play  Jazz FM ".parse::<Command>().unwrap(),
            Command::Play("Jazz FM".to_owned())
        );
        assert_eq!("".parse::<Command>().unwrap(), Command::Toggle);
        assert_eq!("VOL 0.5".parse::<Command>().unwrap(), Command::Volume(0.5));
        assert_eq!("list".parse::<Command>().unwrap(), Command::List(None));
        assert_eq!(
            "ls rock".parse::<Command>().unwrap(),
            Command::List(Some("rock".to_owned()))
        );
        assert_eq!("q".parse::<Command>().unwrap(), Command::Quit);
    }

    #[test]
    fn rejects_bad_arguments() {
        assert!("play".parse::<Command>().is_err());
        assert!("volume loud".parse::<Command>().is_err());
        assert!("volume 1.5".parse::<Command>().is_err());
        assert!("rewind".parse::<Command>().is_err());
    }

    #[test]
    fn summarizes_sessions() {
        let mut session = PlaybackSession::with_volume(0.5);
        assert_eq!(Summary(&session).to_string(), "stopped");

        session.begin(Arc::new(Station::new("j", "Jazz FM", "https://j.example/")));
        session.status = Status::Loading { candidate: 2, of: 3 };
        assert_eq!(
            Summary(&session).to_string(),
            "Jazz FM: tuning (stream 2 of 3) [volume 50%]"
        );

        session.fail(PlaybackError::NoCandidates {
            station: "Jazz FM".to_owned(),
        });
        assert!(Summary(&session).to_string().contains("Jazz FM"));
    }
}
