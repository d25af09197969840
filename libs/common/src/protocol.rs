//! Line protocol shared by the chat server and its clients.
//!
//! Every line is `<command>|<arguments>`. Only the first delimiter separates
//! the command from its arguments.

/// Separates the command from its arguments, and subscribe pairs from each other.
pub const DELIMITER: char = '|';

/// Separates a room name from a nick inside a subscribe pair.
pub const PAIR_SEPARATOR: char = ':';

pub const SUBSCRIBE: &str = "subscribe";
pub const PUBLISH: &str = "publish";

/// Split `head|tail` on the first delimiter. A line without one yields an empty tail.
pub fn split_first(line: &str) -> (&str, &str) {
    line.split_once(DELIMITER).unwrap_or((line, ""))
}

/// Format a message as seen by other room members: `<nick>@<room>: <text>`.
pub fn public_message(nick: &str, room: &str, text: &str) -> String {
    format!("{nick}@{room}: {text}")
}

/// Build a subscribe command line for the given `(room, nick)` pairs.
pub fn subscribe_line<'a, I>(pairs: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let args: Vec<String> = pairs
        .into_iter()
        .map(|(room, nick)| format!("{room}{PAIR_SEPARATOR}{nick}"))
        .collect();
    format!("{SUBSCRIBE}{DELIMITER}{}", args.join(&DELIMITER.to_string()))
}

/// Build a publish command line.
pub fn publish_line(room: &str, text: &str) -> String {
    format!("{PUBLISH}{DELIMITER}{room}{DELIMITER}{text}")
}
