//! Chat template formatting for various model families.
//!
//! Different LLM families use different prompt formats. This module provides
//! template formatting for Llama3, ChatML (Qwen/Kimi), Mistral, and DeepSeek.

use serde_json::Value;

/// Hint for which chat template to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChatTemplateHint {
    /// Try to use the model's embedded template, fall back to ChatML.
    #[default]
    Auto,
    /// Llama 3 format: `<|begin_of_text|><|start_header_id|>system<|end_header_id|>...`
    Llama3,
    /// ChatML format: `<|im_start|>system\n...<|im_end|>` (Qwen, Kimi, Yi)
    ChatML,
    /// Mistral format: `[INST] ... [/INST]`
    Mistral,
    /// DeepSeek format (similar to ChatML with minor differences)
    DeepSeek,
}

impl ChatTemplateHint {
    /// Parse from string (for config).
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "llama3" | "llama" => Self::Llama3,
            "chatml" | "qwen" | "kimi" | "yi" => Self::ChatML,
            "mistral" => Self::Mistral,
            "deepseek" => Self::DeepSeek,
            _ => Self::Auto,
        }
    }
}

/// Format messages using the specified chat template.
///
/// Messages should be JSON objects with "role" and "content" fields.
#[must_use]
pub fn format_messages(messages: &[Value], hint: ChatTemplateHint) -> String {
    match hint {
        ChatTemplateHint::Auto | ChatTemplateHint::ChatML => format_chatml(messages),
        ChatTemplateHint::Llama3 => format_llama3(messages),
        ChatTemplateHint::Mistral => format_mistral(messages),
        ChatTemplateHint::DeepSeek => format_deepseek(messages),
    }
}

/// Format using ChatML template (Qwen, Kimi, Yi).
///
/// ```text
/// <|im_start|>system
/// {system_message}<|im_end|>
/// <|im_start|>user
/// {user_message}<|im_end|>
/// <|im_start|>assistant
/// ```
fn format_chatml(messages: &[Value]) -> String {
    let mut output = String::new();

    for msg in messages {
        let role = msg["role"].as_str().unwrap_or("user");
        let content = msg["content"].as_str().unwrap_or("");

        output.push_str("<|im_start|>");
        output.push_str(role);
        output.push('\n');
        output.push_str(content);
        output.push_str("<|im_end|>\n");
    }

    // Add the assistant prefix for generation
    output.push_str("<|im_start|>assistant\n");
    output
}

/// Format using Llama 3 template.
///
/// ```text
/// <|begin_of_text|><|start_header_id|>system<|end_header_id|>
///
/// {system_message}<|eot_id|><|start_header_id|>user<|end_header_id|>
///
/// {user_message}<|eot_id|><|start_header_id|>assistant<|end_header_id|>
/// ```
fn format_llama3(messages: &[Value]) -> String {
    let mut output = String::from("<|begin_of_text|>");

    for msg in messages {
        let role = msg["role"].as_str().unwrap_or("user");
        let content = msg["content"].as_str().unwrap_or("");

        output.push_str("<|start_header_id|>");
        output.push_str(role);
        output.push_str("<|end_header_id|>\n\n");
        output.push_str(content);
        output.push_str("<|eot_id|>");
    }

    // Add the assistant prefix for generation
    output.push_str("<|start_header_id|>assistant<|end_header_id|>\n\n");
    output
}

/// Format using Mistral template.
///
/// ```text
/// <s>[INST] {system_message}
///
/// {user_message} [/INST]
/// ```
fn format_mistral(messages: &[Value]) -> String {
    let mut output = String::from("<s>");
    let mut in_inst = false;
    let mut system_content = String::new();

    for msg in messages {
        let role = msg["role"].as_str().unwrap_or("user");
        let content = msg["content"].as_str().unwrap_or("");

        match role {
            "system" => {
                // System message is prepended to the first user message
                system_content = content.to_string();
            },
            "user" => {
                if in_inst {
                    output.push_str("</s>");
                }
                output.push_str("[INST] ");
                if !system_content.is_empty() {
                    output.push_str(&system_content);
                    output.push_str("\n\n");
                    system_content.clear();
                }
                output.push_str(content);
                output.push_str(" [/INST]");
                in_inst = true;
            },
            "assistant" => {
                output.push_str(content);
                in_inst = false;
            },
            _ => {},
        }
    }

    output
}

/// Format using DeepSeek template (similar to ChatML).
///
/// ```text
/// <|begin▁of▁sentence|>system
/// {system_message}
/// <|User|>{user_message}
/// <|Assistant|>
/// ```
fn format_deepseek(messages: &[Value]) -> String {
    let mut output = String::from("<|begin▁of▁sentence|>");

    for msg in messages {
        let role = msg["role"].as_str().unwrap_or("user");
        let content = msg["content"].as_str().unwrap_or("");

        match role {
            "system" => {
                output.push_str("system\n");
                output.push_str(content);
                output.push('\n');
            },
            "user" => {
                output.push_str("<|User|>");
                output.push_str(content);
                output.push('\n');
            },
            "assistant" => {
                output.push_str("<|Assistant|>");
                output.push_str(content);
                output.push('\n');
            },
            _ => {},
        }
    }

    // Add the assistant prefix for generation
    output.push_str("<|Assistant|>");
    output
}
