use serde::{Deserialize, Serialize};

use crate::message::IncomingMessage;

/// Answer(s) stored under one capture key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Captured {
    Single(IncomingMessage),
    Multiple(Vec<IncomingMessage>),
}

impl Captured {
    pub(crate) fn push(&mut self, answer: IncomingMessage) {
        match self {
            Self::Multiple(list) => list.push(answer),
            Self::Single(first) => {
                let first = std::mem::take(first);
                *self = Self::Multiple(vec![first, answer]);
            }
        }
    }

    #[must_use]
    pub fn answers(&self) -> &[IncomingMessage] {
        match self {
            Self::Single(one) => std::slice::from_ref(one),
            Self::Multiple(list) => list,
        }
    }

    /// Question the (first) answer was given to.
    #[must_use]
    pub fn question(&self) -> &str {
        self.answers()
            .first()
            .and_then(|m| m.question.as_deref())
            .unwrap_or_default()
    }

    /// Collapse to one string.
    ///
    /// Several answers are joined by newlines; when more than one user
    /// answered, every line after the first carries `<@user>: `.
    #[must_use]
    pub fn combined(&self) -> String {
        let answers = self.answers();
        let Some(first) = answers.first() else {
            return String::new();
        };
        let several_users = answers.iter().any(|m| m.user != first.user);
        answers
            .iter()
            .enumerate()
            .map(|(i, m)| {
                if i > 0 && several_users {
                    format!("<@{}>: {}", m.user, m.text())
                } else {
                    m.text().to_string()
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Question, key and collapsed answer for one capture key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseView {
    pub question: String,
    pub key: String,
    pub answer: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn answer(user: &str, text: &str) -> IncomingMessage {
        IncomingMessage::new(user, "C1", text)
    }

    #[test]
    fn single_answer_is_its_text() {
        assert_eq!(Captured::Single(answer("U1", "Ada")).combined(), "Ada");
    }

    #[test]
    fn same_user_lines_are_unprefixed() {
        let mut captured = Captured::Multiple(vec![answer("U1", "one")]);
        captured.push(answer("U1", "two"));
        assert_eq!(captured.combined(), "one\ntwo");
    }

    #[test]
    fn distinct_users_prefix_later_lines() {
        let mut captured = Captured::Single(answer("U1", "red"));
        captured.push(answer("U2", "blue"));
        assert_eq!(captured.combined(), "red\n<@U2>: blue");
    }

    #[test]
    fn empty_multiple_is_empty_string() {
        assert_eq!(Captured::Multiple(Vec::new()).combined(), "");
    }
}
