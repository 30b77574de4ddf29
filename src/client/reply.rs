use crate::engine::reader::ReadResult;

/// One server reply, already decoded into printable text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub code: Option<u16>,
    pub text: String,
    pub truncated: bool,
}

impl Reply {
    pub fn from_text(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            code: reply_code(&text),
            text,
            truncated: false,
        }
    }

    pub fn is_positive(&self) -> bool {
        is_positive(&self.text)
    }

    /// Any 2yz code.
    pub fn is_completion(&self) -> bool {
        matches!(self.code, Some(200..=299))
    }
}

impl From<ReadResult> for Reply {
    fn from(result: ReadResult) -> Self {
        let text = result.text();
        Self {
            code: reply_code(&text),
            truncated: result.truncated,
            text,
        }
    }
}

pub fn reply_code(reply: &str) -> Option<u16> {
    let head = reply.get(..3)?;
    if !head.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    head.parse().ok()
}

/// 250 (completed) and 251 (will forward) both mean the mailbox exists.
pub fn is_positive(reply: &str) -> bool {
    matches!(reply.get(..3), Some("250") | Some("251"))
}

/// A 502 means the verb itself is switched off, as opposed to a rejection of
/// the particular user.
pub fn verb_disabled(reply: &str) -> bool {
    reply.starts_with("502")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positive_only_for_250_and_251() {
        assert!(is_positive("250 2.1.5 root"));
        assert!(is_positive("251 User not local; will forward"));
        assert!(is_positive("250"));
        for reply in [
            "550 No such user",
            "551 User not local",
            "502 Command not implemented",
            "503 Bad sequence",
            "252 Cannot VRFY user",
            "220 ready",
            "garbage",
            "",
            "25",
        ] {
            assert!(!is_positive(reply), "{reply:?} must be negative");
        }
    }

    #[test]
    fn only_502_disables_a_verb() {
        assert!(verb_disabled("502 5.5.1 VRFY disabled"));
        assert!(!verb_disabled("550 No such user"));
        assert!(!verb_disabled("503 need MAIL first"));
        assert!(!verb_disabled("252 Cannot VRFY"));
    }

    #[test]
    fn classification_is_repeatable() {
        let reply = "250 2.1.5 root";
        assert_eq!(is_positive(reply), is_positive(reply));
        assert_eq!(verb_disabled(reply), verb_disabled(reply));
    }

    #[test]
    fn parses_code() {
        assert_eq!(reply_code("250 ok"), Some(250));
        assert_eq!(reply_code("25x ok"), None);
        assert_eq!(reply_code("ok"), None);
        let reply = Reply::from_text("221 bye");
        assert!(reply.is_completion());
        assert!(!reply.is_positive());
    }
}
