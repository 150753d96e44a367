use soulframe_core::SystemMode;

/// One line of terminal input.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Quit,
    Skip,
    Mode(SystemMode),
    Climate,
    Mood,
    Help,
    Say(String),
}

pub const HELP: &str = "Commands: /mode normal|lockdown|extracted, /climate, /mood, /help, quit";

pub fn parse(line: &str) -> anyhow::Result<Command> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(Command::Skip);
    }
    if trimmed == "quit" || trimmed == "exit" {
        return Ok(Command::Quit);
    }
    let Some(rest) = trimmed.strip_prefix('/') else {
        return Ok(Command::Say(trimmed.to_string()));
    };

    let mut parts = rest.split_whitespace();
    match parts.next().unwrap_or_default() {
        "mode" => {
            let arg = parts
                .next()
                .ok_or_else(|| anyhow::anyhow!("usage: /mode normal|lockdown|extracted"))?;
            Ok(Command::Mode(arg.parse()?))
        }
        "climate" => Ok(Command::Climate),
        "mood" => Ok(Command::Mood),
        "help" => Ok(Command::Help),
        other => anyhow::bail!("unknown command: /{}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_is_said() {
        assert_eq!(parse("  hi there ").unwrap(), Command::Say("hi there".into()));
        assert_eq!(parse("   ").unwrap(), Command::Skip);
        assert_eq!(parse("exit").unwrap(), Command::Quit);
    }

    #[test]
    fn test_mode_switch() {
        assert_eq!(
            parse("/mode LOCKDOWN").unwrap(),
            Command::Mode(SystemMode::Lockdown)
        );
        assert!(parse("/mode").is_err());
        assert!(parse("/mode sideways").is_err());
    }

    #[test]
    fn test_unknown_command() {
        assert!(parse("/dance").is_err());
        assert_eq!(parse("/climate").unwrap(), Command::Climate);
    }
}
