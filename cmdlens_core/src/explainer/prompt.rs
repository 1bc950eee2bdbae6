use serde::Serialize;
use std::borrow::Cow;

/// Captured output beyond this many bytes is cut before it goes into a prompt.
pub const MAX_PROMPT_OUTPUT_BYTES: usize = 16 * 1024;

/// What the explainer is told about one executed command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExplainContext {
    pub command: String,
    pub description: Option<String>,
    pub output: String,
}

impl ExplainContext {
    pub fn new(command: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            description: None,
            output: output.into(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// The prompts the gateway knows how to send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PromptTemplate {
    /// One-line plain-language explanation of a command's output.
    Explain,
    /// One-line summary prefixed with a ✅ / ⚠️ / 🔴 severity marker.
    HealthSeverity,
}

impl PromptTemplate {
    pub fn render(&self, context: &ExplainContext) -> String {
        let output = truncate_output(&context.output);
        match self {
            PromptTemplate::Explain => format!(
                "Explain this system command output in a concise and short single line:\n\n\
                 Command: {}\n\nOutput:\n{}",
                context.command, output
            ),
            PromptTemplate::HealthSeverity => {
                let subject = context.description.as_deref().unwrap_or(&context.command);
                format!(
                    "Analyze this system command output for {}.\n\
                     Add a one-line summary with a severity marker:\n\
                     - ✅ Healthy\n\
                     - ⚠️ Warning (if moderately high)\n\
                     - 🔴 Critical (if very high or dangerous)\n\n\
                     Command: {}\nOutput:\n{}",
                    subject, context.command, output
                )
            }
        }
    }
}

fn truncate_output(output: &str) -> Cow<'_, str> {
    if output.len() <= MAX_PROMPT_OUTPUT_BYTES {
        return Cow::Borrowed(output);
    }
    let mut cut = MAX_PROMPT_OUTPUT_BYTES;
    while !output.is_char_boundary(cut) {
        cut -= 1;
    }
    Cow::Owned(format!(
        "{}\n[output truncated, {} of {} bytes shown]",
        &output[..cut],
        cut,
        output.len()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explain_prompt_embeds_command_and_output() {
        let ctx = ExplainContext::new("df -h", "/dev/sda1  50G  20G  30G  40% /");
        let prompt = PromptTemplate::Explain.render(&ctx);
        assert!(prompt.starts_with("Explain this system command output"));
        assert!(prompt.contains("Command: df -h\n\nOutput:\n/dev/sda1"));
    }

    #[test]
    fn test_health_prompt_names_severity_vocabulary() {
        let ctx = ExplainContext::new("free -h", "Mem: 16Gi 4Gi").with_description("Memory usage");
        let prompt = PromptTemplate::HealthSeverity.render(&ctx);
        assert!(prompt.starts_with("Analyze this system command output for Memory usage."));
        for marker in ["✅ Healthy", "⚠️ Warning", "🔴 Critical"] {
            assert!(prompt.contains(marker), "missing {marker}");
        }
        assert!(prompt.ends_with("Command: free -h\nOutput:\nMem: 16Gi 4Gi"));
    }

    #[test]
    fn test_long_output_is_cut_on_char_boundary() {
        let output = "é".repeat(MAX_PROMPT_OUTPUT_BYTES);
        let truncated = truncate_output(&output);
        assert!(truncated.contains("[output truncated"));
        assert!(truncated.len() < output.len());

        assert!(matches!(truncate_output("short"), Cow::Borrowed("short")));
    }
}
