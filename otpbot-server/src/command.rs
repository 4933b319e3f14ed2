//! Command parsing for subscriber messages and keyboard button presses.

/// A recognized bot command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Show the welcome menu.
    Start,
    /// Issue a fresh OTP for the recorded phone.
    Resend,
    /// Show usage help.
    Help,
}

/// Parse a message text as a bot command.
///
/// Recognizes slash commands (case-insensitive, with an optional `@botname`
/// suffix) and the reply-keyboard button labels, which Telegram delivers as
/// plain message text. Anything else is not a command.
pub fn parse_command(text: &str) -> Option<Command> {
    let trimmed = text.trim();

    // Keyboard buttons send their label verbatim.
    match trimmed {
        "🔁 Resend OTP" => return Some(Command::Resend),
        "ℹ️ Help" => return Some(Command::Help),
        _ => {}
    }

    let candidate = trimmed.strip_prefix('/')?;
    // Telegram appends "@botname" when commands are tapped in some clients.
    let candidate = candidate
        .split_once('@')
        .map(|(cmd, _)| cmd)
        .unwrap_or(candidate);

    match candidate.to_ascii_lowercase().as_str() {
        "start" => Some(Command::Start),
        "resend" => Some(Command::Resend),
        "help" => Some(Command::Help),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_slash_commands() {
        assert_eq!(parse_command("/start"), Some(Command::Start));
        assert_eq!(parse_command("/resend"), Some(Command::Resend));
        assert_eq!(parse_command("/help"), Some(Command::Help));
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!(parse_command("/START"), Some(Command::Start));
        assert_eq!(parse_command("/Resend"), Some(Command::Resend));
        assert_eq!(parse_command("/HeLp"), Some(Command::Help));
    }

    #[test]
    fn test_parse_strips_botname_suffix() {
        assert_eq!(parse_command("/resend@OtpBot"), Some(Command::Resend));
        assert_eq!(parse_command("/start@some_other_bot"), Some(Command::Start));
    }

    #[test]
    fn test_parse_trims_whitespace() {
        assert_eq!(parse_command("  /resend  "), Some(Command::Resend));
        assert_eq!(parse_command("\n/start"), Some(Command::Start));
    }

    #[test]
    fn test_parse_keyboard_labels() {
        assert_eq!(parse_command("🔁 Resend OTP"), Some(Command::Resend));
        assert_eq!(parse_command("ℹ️ Help"), Some(Command::Help));
        assert_eq!(parse_command("  🔁 Resend OTP  "), Some(Command::Resend));
    }

    #[test]
    fn test_contact_button_label_is_not_a_command() {
        // Tapping the contact button sends a contact payload, not this text;
        // if the label somehow arrives as text it is ordinary input.
        assert_eq!(parse_command("📱 Send Phone Number"), None);
    }

    #[test]
    fn test_non_commands_are_rejected() {
        assert_eq!(parse_command("hello"), None);
        assert_eq!(parse_command("+15551234567"), None);
        assert_eq!(parse_command("483920"), None);
        assert_eq!(parse_command(""), None);
        assert_eq!(parse_command("resend"), None);
        assert_eq!(parse_command("/unknown"), None);
    }

    #[test]
    fn test_command_with_trailing_arguments_is_rejected() {
        // A payload after the command name makes it ordinary text.
        assert_eq!(parse_command("/start ref123"), None);
        assert_eq!(parse_command("/resend now"), None);
    }
}
