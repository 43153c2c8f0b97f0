// SPDX-FileCopyrightText: 2026 KobeAI Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Locally answered "who are you" questions.

/// Phrases that mark a message as a question about the assistant itself.
const IDENTITY_PHRASES: &[&str] = &[
    "你是谁",
    "你叫什么",
    "你的名字",
    "你的身份",
    "你是什么",
    "介绍一下你自己",
    "自我介绍",
    "who are you",
    "what is your name",
    "what are you",
];

pub const IDENTITY_REPLY: &str =
    "您好！我是KobeAI，一个智能助手。我可以帮助您解答问题、完成任务，让我们开始对话吧！";

/// Canned reply for identity questions, `None` for everything else.
pub fn identity_reply(message: &str) -> Option<&'static str> {
    let lowered = message.to_lowercase();
    IDENTITY_PHRASES
        .iter()
        .any(|phrase| lowered.contains(phrase))
        .then_some(IDENTITY_REPLY)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_phrases_case_insensitively() {
        assert_eq!(identity_reply("请问你是谁？"), Some(IDENTITY_REPLY));
        assert_eq!(identity_reply("Hey, WHO ARE YOU"), Some(IDENTITY_REPLY));
        assert_eq!(identity_reply("先做个自我介绍吧"), Some(IDENTITY_REPLY));
        assert_eq!(identity_reply("What is your name?"), Some(IDENTITY_REPLY));
    }

    #[test]
    fn ordinary_messages_pass_through() {
        assert_eq!(identity_reply("写一首关于秋天的诗"), None);
        assert_eq!(identity_reply("what time is it"), None);
        assert_eq!(identity_reply("你好"), None);
    }
}
