use crate::format::RenderFormat;
use crate::protocol::WireMessage;
use crate::state::{ChatMessage, ChatRole, ProblemContext};

const TUTOR_ROLE: &str = "You are a helpful programming assistant that provides hints and guidance for LeetCode problems without giving away complete solutions.";

const HTML_STYLE: &str = "Please format your responses using proper HTML paragraph tags (<p>) with spacing between paragraphs. Use <br> for line breaks within paragraphs. You can use <b> for bold text and <code> for code snippets. Do not use bullet points or lists unless specifically requested. Keep the tone conversational and clear.";

const MARKDOWN_STYLE: &str = "Please format your responses as short Markdown paragraphs separated by blank lines. Use **bold** for emphasis, `backticks` for inline code and fenced blocks for longer snippets. Do not use bullet points or lists unless specifically requested. Keep the tone conversational and clear.";

const GUIDANCE: &str = "Please guide me step by step without giving away the solution. If I have code written, ask about my thought process before providing hints. Help me understand the problem better and work towards an optimal solution.";

pub fn system_prompt(format: RenderFormat) -> String {
    let style = match format {
        RenderFormat::Html => HTML_STYLE,
        RenderFormat::Markdown => MARKDOWN_STYLE,
    };
    format!("{} {}", TUTOR_ROLE, style)
}

/// Prompt for the opening turn: the whole problem plus the question.
pub fn first_turn_prompt(context: &ProblemContext, message: &str) -> String {
    let mut prompt = String::new();
    prompt.push_str("I'm working on this LeetCode problem:\n");
    prompt.push_str(&format!("Title: {}\n", context.title));
    prompt.push_str(&format!("Description: {}\n", context.description));
    prompt.push_str(&format!("Current Code: {}\n", context.current_code));
    prompt.push_str(&format!("\nQuestion: {}\n\n", message));
    prompt.push_str(GUIDANCE);
    prompt
}

/// Prompt for later turns. The model already has the title and description
/// from the first turn, so only the code is refreshed.
pub fn follow_up_prompt(current_code: &str, message: &str) -> String {
    let mut prompt = String::new();
    prompt.push_str(&format!("My current code:\n{}\n", current_code));
    prompt.push_str(&format!("\nQuestion: {}", message));
    prompt
}

/// Messages for a `getHelp` request coming from the popup. The popup keeps
/// its own transcript, so every request restates the full problem.
///
/// `history` is the popup's transcript; its trailing entry is the message
/// being asked about and is replaced by the full prompt.
pub fn help_messages(
    format: RenderFormat,
    context: &ProblemContext,
    history: &[ChatMessage],
    message: &str,
) -> Vec<WireMessage> {
    let prior = match history.last() {
        Some(last) if last.is_user && last.content == message => &history[..history.len() - 1],
        _ => history,
    };

    let mut messages = Vec::with_capacity(prior.len() + 2);
    messages.push(WireMessage::new(ChatRole::System, system_prompt(format)));
    messages.extend(prior.iter().map(WireMessage::from));
    messages.push(WireMessage::new(
        ChatRole::User,
        first_turn_prompt(context, message),
    ));
    messages
}
