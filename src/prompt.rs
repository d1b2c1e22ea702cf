use crate::api::models::SummarizeRequest;
use crate::llm::Message;
use crate::truncate_chars;

const SUMMARY_SYSTEM_PROMPT: &str = "You are an intelligent content analyzer. Your task is to provide a concise summary of the main points from the content using minimal words. Prioritize information density over verbosity. For social media or discussion content, focus on the predominant opinions and overall sentiment. For regular web pages, focus on the main factual information and key points. Use bullet points when appropriate. Format the response for easy reading in a browser extension popup.";

/// Picks the system instruction. A blank custom prompt counts as absent.
pub fn system_prompt(custom_prompt: Option<&str>) -> String {
    match custom_prompt.map(str::trim).filter(|p| !p.is_empty()) {
        Some(instruction) => format!(
            "You are a helpful AI assistant. Please analyze the provided web content and answer the following specific question or follow the given instruction: \"{}\". Be concise and direct - use minimal words while preserving all important details. If the question cannot be answered based on the content provided, please state that clearly.",
            instruction
        ),
        None => SUMMARY_SYSTEM_PROMPT.to_string(),
    }
}

pub fn user_message(req: &SummarizeRequest, content_budget: usize) -> String {
    let content = truncate_chars(&req.content, content_budget);

    let mut result = String::with_capacity(content.len() + 256);
    result.push_str("Please analyze this web content:\n\n");
    if let Some(title) = non_blank(req.title.as_deref()) {
        result.push_str("Title: ");
        result.push_str(title);
        result.push_str("\n\n");
    }
    if let Some(description) = non_blank(req.description.as_deref()) {
        result.push_str("Description: ");
        result.push_str(description);
        result.push_str("\n\n");
    }
    result.push_str("Content: ");
    result.push_str(content);
    result
}

/// System and user messages for one summarize call.
pub fn compose(req: &SummarizeRequest, content_budget: usize) -> Vec<Message> {
    vec![
        Message::system(system_prompt(req.custom_prompt.as_deref())),
        Message::user(user_message(req, content_budget)),
    ]
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(content: &str) -> SummarizeRequest {
        SummarizeRequest {
            url: None,
            title: None,
            content: content.to_string(),
            custom_prompt: None,
            description: None,
        }
    }

    #[test]
    fn default_prompt_without_custom_instruction() {
        assert_eq!(system_prompt(None), SUMMARY_SYSTEM_PROMPT);
        assert_eq!(system_prompt(Some("   ")), SUMMARY_SYSTEM_PROMPT);
    }

    #[test]
    fn custom_instruction_is_embedded() {
        let prompt = system_prompt(Some(" Who wrote this? "));
        assert!(prompt.contains("\"Who wrote this?\""));
        assert_ne!(prompt, SUMMARY_SYSTEM_PROMPT);
    }

    #[test]
    fn user_message_includes_present_fields_in_order() {
        let mut req = request("Body text here");
        req.title = Some("A title".to_string());
        req.description = Some("A short blurb".to_string());

        assert_eq!(
            user_message(&req, 15_000),
            "Please analyze this web content:\n\nTitle: A title\n\nDescription: A short blurb\n\nContent: Body text here"
        );
    }

    #[test]
    fn blank_optional_fields_are_skipped() {
        let mut req = request("Body text here");
        req.title = Some("  ".to_string());

        assert_eq!(
            user_message(&req, 15_000),
            "Please analyze this web content:\n\nContent: Body text here"
        );
    }

    #[test]
    fn content_is_cut_to_budget() {
        let req = request(&"x".repeat(20_000));
        let message = user_message(&req, 15_000);
        assert!(message.ends_with(&format!("Content: {}", "x".repeat(15_000))));
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("abc", 0), "");
    }

    #[test]
    fn compose_builds_system_then_user() {
        let mut req = request("Body text here");
        req.custom_prompt = Some("List the dates".to_string());

        let messages = compose(&req, 15_000);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, "system");
        assert!(messages[0].content.contains("List the dates"));
        assert_eq!(messages[1].role, "user");
    }
}
