//! Prompt construction and response parsing for outline and draft generation.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::{
    error::AppError,
    models::{
        brief::{self, ContentBrief, OutlineSection},
        project::ProjectSettings,
    },
    services::ai_provider::{AiProvider, ChatMessage, GenerationOptions},
};

const OUTLINE_MAX_TOKENS: u32 = 2000;
const FALLBACK_KEYWORD: &str = "topic";
const FALLBACK_TONE: &str = "NEUTRAL";
const FALLBACK_AUDIENCE: &str = "general readers";
pub const UNTITLED_DRAFT: &str = "Untitled Draft";

static OUTLINE_LINE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(#{1,3})\s+(.+)$").unwrap());
static H1_LINE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^#\s+(.+)$").unwrap());

const OUTLINE_SYSTEM: &str = "You are an expert SEO content strategist. Create detailed article outlines that are comprehensive, well-structured, and optimized for search engines.";

const OUTLINE_FORMAT: &str = "Format the outline as a hierarchical structure using this format:
# Main Title (H1)
## Introduction (H2)
## Main Section 1 (H2)
### Subsection 1.1 (H3)
### Subsection 1.2 (H3)
## Main Section 2 (H2)
### Subsection 2.1 (H3)
## FAQ (if applicable) (H2)
## Conclusion (H2)

Ensure the outline is comprehensive, logical, and covers all important aspects of the topic.";

/// Values shared by both prompts, with fallbacks applied.
struct PromptContext {
    keyword: String,
    tone: String,
    audience: String,
    word_count: i32,
    entities: String,
}

impl PromptContext {
    fn new(brief: &ContentBrief, settings: Option<&ProjectSettings>) -> Self {
        let keyword = brief
            .target_keyword
            .clone()
            .filter(|k| !k.is_empty())
            .unwrap_or_else(|| FALLBACK_KEYWORD.to_string());
        let tone = settings
            .and_then(|s| s.tone.as_deref())
            .filter(|t| !t.is_empty())
            .unwrap_or(FALLBACK_TONE)
            .to_lowercase();
        let audience = settings
            .and_then(|s| s.target_audience.clone())
            .filter(|a| !a.is_empty())
            .unwrap_or_else(|| FALLBACK_AUDIENCE.to_string());

        Self {
            keyword,
            tone,
            audience,
            word_count: brief.word_count_or_default(),
            entities: brief::entity_terms(&brief.entities).join(", "),
        }
    }
}

pub fn outline_messages(brief: &ContentBrief, settings: Option<&ProjectSettings>) -> Vec<ChatMessage> {
    let ctx = PromptContext::new(brief, settings);
    let keyword = &ctx.keyword;

    let mut user = format!(
        "Create a detailed outline for an article about \"{keyword}\".\n\n\
         Requirements:\n\
         - Target keyword: {keyword}\n\
         - Tone: {}\n\
         - Target audience: {}\n\
         - Target word count: {} words\n",
        ctx.tone, ctx.audience, ctx.word_count
    );
    if !ctx.entities.is_empty() {
        user.push_str(&format!("- Must cover these entities/topics: {}\n", ctx.entities));
    }

    let headings = brief::heading_texts(&brief.headings);
    if !headings.is_empty() {
        user.push_str(&format!(
            "\n- Suggested headings from research:\n- {}\n",
            headings.join("\n- ")
        ));
    }

    let questions = brief::faq_questions(&brief.faq);
    if !questions.is_empty() {
        user.push_str("\nInclude an FAQ section addressing:\n");
        for question in &questions {
            user.push_str(&format!("- {question}\n"));
        }
    }

    user.push('\n');
    user.push_str(OUTLINE_FORMAT);

    vec![ChatMessage::system(OUTLINE_SYSTEM), ChatMessage::user(user)]
}

pub fn draft_messages(
    brief: &ContentBrief,
    outline: &[OutlineSection],
    settings: Option<&ProjectSettings>,
) -> Vec<ChatMessage> {
    let ctx = PromptContext::new(brief, settings);
    let keyword = &ctx.keyword;

    let system = format!(
        "You are an expert SEO content writer. Write high-quality, engaging articles that are optimized for search engines while providing genuine value to readers.\n\n\
         Writing guidelines:\n\
         - Write in a {} tone\n\
         - Target audience: {}\n\
         - Use clear, concise language\n\
         - Include relevant examples and explanations\n\
         - Structure content with proper headings\n\
         - Naturally incorporate key entities and topics\n\
         - Write in markdown format",
        ctx.tone, ctx.audience
    );

    let mut user = format!(
        "Write a comprehensive article about \"{keyword}\" following this outline:\n\n\
         {}\n\
         Requirements:\n\
         - Target word count: {} words\n\
         - Focus keyword: {keyword}\n",
        format_outline(outline),
        ctx.word_count
    );
    if !ctx.entities.is_empty() {
        user.push_str(&format!("- Naturally incorporate these topics: {}\n", ctx.entities));
    }

    let links = internal_link_lines(&brief.internal_links);
    if !links.is_empty() {
        user.push_str(&format!(
            "\n- Include these internal links where relevant:\n{}\n",
            links.join("\n")
        ));
    }

    let refs = external_ref_lines(&brief.external_refs);
    if !refs.is_empty() {
        user.push_str(&format!(
            "\n- Reference these sources where appropriate:\n{}\n",
            refs.join("\n")
        ));
    }

    user.push_str(&format!(
        "\nContent guidelines:\n\
         - Write engaging, informative content that provides real value\n\
         - Use a {} tone appropriate for {}\n\
         - Include practical examples and actionable advice\n\
         - Ensure smooth transitions between sections\n\
         - Start with a compelling introduction\n\
         - End with a strong conclusion that summarizes key points\n\
         - Use markdown formatting (headings, lists, bold, links)\n\n\
         Write the full article now in markdown format:",
        ctx.tone, ctx.audience
    ));

    vec![ChatMessage::system(system), ChatMessage::user(user)]
}

fn internal_link_lines(links: &Value) -> Vec<String> {
    links
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| match item {
                    Value::String(s) => Some(format!("- {s}")),
                    Value::Object(obj) => {
                        let label = obj
                            .get("text")
                            .or_else(|| obj.get("title"))
                            .and_then(Value::as_str)
                            .unwrap_or_default();
                        let url = obj.get("url").and_then(Value::as_str).unwrap_or_default();
                        (!label.is_empty() || !url.is_empty()).then(|| format!("- {label}: {url}"))
                    }
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default()
}

fn external_ref_lines(refs: &Value) -> Vec<String> {
    refs.as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| match item {
                    Value::String(s) => Some(s.as_str()),
                    Value::Object(obj) => obj
                        .get("title")
                        .or_else(|| obj.get("url"))
                        .and_then(Value::as_str),
                    _ => None,
                })
                .map(|label| format!("- {label}"))
                .collect()
        })
        .unwrap_or_default()
}

/// Parse `#`, `##` and `###` lines into a heading tree. Other lines are ignored.
pub fn parse_outline(text: &str) -> Vec<OutlineSection> {
    let mut roots: Vec<OutlineSection> = Vec::new();
    // Path of child indices from the roots down to the most recent heading.
    let mut path: Vec<(usize, u8)> = Vec::new();

    for line in text.lines().map(str::trim_end).filter(|l| !l.trim().is_empty()) {
        let Some(caps) = OUTLINE_LINE.captures(line) else {
            continue;
        };
        let level = caps[1].len() as u8;
        let section = OutlineSection {
            heading: caps[2].trim().to_string(),
            level,
            subheadings: Vec::new(),
        };

        while path.last().is_some_and(|(_, l)| *l >= level) {
            path.pop();
        }

        let siblings = children_at(&mut roots, &path);
        siblings.push(section);
        let index = siblings.len() - 1;
        path.push((index, level));
    }

    roots
}

fn children_at<'a>(
    roots: &'a mut Vec<OutlineSection>,
    path: &[(usize, u8)],
) -> &'a mut Vec<OutlineSection> {
    path.iter()
        .fold(roots, |list, (index, _)| &mut list[*index].subheadings)
}

/// Render an outline back to markdown heading lines.
pub fn format_outline(outline: &[OutlineSection]) -> String {
    let mut out = String::new();
    for section in outline {
        out.push_str(&"#".repeat(section.level as usize));
        out.push(' ');
        out.push_str(&section.heading);
        out.push('\n');
        out.push_str(&format_outline(&section.subheadings));
    }
    out
}

/// Title of a generated draft: its first H1, else the keyword, else a placeholder.
pub fn extract_title(markdown: &str, keyword: Option<&str>) -> String {
    H1_LINE
        .captures(markdown)
        .map(|caps| caps[1].trim().to_string())
        .or_else(|| keyword.filter(|k| !k.is_empty()).map(str::to_string))
        .unwrap_or_else(|| UNTITLED_DRAFT.to_string())
}

pub async fn generate_outline(
    provider: &dyn AiProvider,
    brief: &ContentBrief,
    settings: Option<&ProjectSettings>,
) -> Result<Vec<OutlineSection>, AppError> {
    let messages = outline_messages(brief, settings);
    let text = provider
        .generate_text(&messages, &GenerationOptions::with_max_tokens(OUTLINE_MAX_TOKENS))
        .await?;

    let outline = parse_outline(&text);
    tracing::debug!(
        provider = provider.name(),
        brief_id = %brief.id,
        sections = outline.len(),
        "outline generated"
    );
    Ok(outline)
}

pub async fn generate_draft(
    provider: &dyn AiProvider,
    brief: &ContentBrief,
    outline: &[OutlineSection],
    settings: Option<&ProjectSettings>,
) -> Result<String, AppError> {
    let messages = draft_messages(brief, outline, settings);
    let max_tokens = (brief.word_count_or_default().max(1) as u32) * 2;
    provider
        .generate_text(&messages, &GenerationOptions::with_max_tokens(max_tokens))
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Mutex;
    use uuid::Uuid;

    fn sample_brief() -> ContentBrief {
        ContentBrief {
            id: Uuid::new_v4(),
            project_id: Uuid::new_v4(),
            cluster_id: None,
            target_keyword_id: None,
            target_keyword: Some("trail running shoes".into()),
            headings: json!(["Cushioning", {"title": "Grip"}]),
            entities: json!(["drop", {"term": "rock plate"}]),
            faq: json!([{"question": "How long do they last?"}]),
            internal_links: json!([{"text": "Sizing guide", "url": "/sizing"}]),
            external_refs: json!([{"url": "https://example.com/study"}]),
            recommended_word_count: Some(1200),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    struct Recorder {
        reply: String,
        seen: Mutex<Vec<(Vec<ChatMessage>, GenerationOptions)>>,
    }

    #[async_trait]
    impl AiProvider for Recorder {
        fn name(&self) -> &'static str {
            "recorder"
        }

        async fn generate_text(
            &self,
            messages: &[ChatMessage],
            options: &GenerationOptions,
        ) -> Result<String, AppError> {
            self.seen
                .lock()
                .unwrap()
                .push((messages.to_vec(), options.clone()));
            Ok(self.reply.clone())
        }
    }

    #[test]
    fn outline_parser_nests_by_level() {
        let text = "Here you go:\n# Guide\n## Intro\n## Picks\n### Budget\n### Premium\n## FAQ\nnot a heading\n#### too deep";
        let outline = parse_outline(text);

        assert_eq!(outline.len(), 1);
        let guide = &outline[0];
        assert_eq!(guide.heading, "Guide");
        let names: Vec<_> = guide.subheadings.iter().map(|s| s.heading.as_str()).collect();
        assert_eq!(names, vec!["Intro", "Picks", "FAQ"]);
        assert_eq!(guide.subheadings[1].subheadings.len(), 2);
        assert_eq!(guide.subheadings[1].subheadings[1].level, 3);
    }

    #[test]
    fn outline_without_h1_keeps_h2s_at_top() {
        let outline = parse_outline("## One\n### One.a\n## Two");
        assert_eq!(outline.len(), 2);
        assert_eq!(outline[0].subheadings[0].heading, "One.a");
    }

    #[test]
    fn formatted_outline_reparses_to_the_same_tree() {
        let outline = parse_outline("# A\n## B\n### C\n## D");
        assert_eq!(format_outline(&outline), "# A\n## B\n### C\n## D\n");
    }

    #[test]
    fn title_comes_from_first_h1() {
        assert_eq!(extract_title("intro\n# Best Shoes\n# Other", Some("kw")), "Best Shoes");
        assert_eq!(extract_title("## Only H2", Some("kw")), "kw");
        assert_eq!(extract_title("plain", None), UNTITLED_DRAFT);
    }

    #[test]
    fn outline_prompt_applies_fallbacks() {
        let mut brief = sample_brief();
        brief.target_keyword = None;
        brief.recommended_word_count = None;
        let messages = outline_messages(&brief, None);
        let user = &messages[1].content;

        assert!(user.contains("article about \"topic\""));
        assert!(user.contains("- Tone: neutral"));
        assert!(user.contains("- Target audience: general readers"));
        assert!(user.contains("- Target word count: 1500 words"));
        assert!(user.contains("- Must cover these entities/topics: drop, rock plate"));
        assert!(user.contains("- Cushioning\n- Grip"));
        assert!(user.contains("- How long do they last?"));
    }

    #[test]
    fn draft_prompt_lists_links_and_references() {
        let settings = ProjectSettings {
            tone: Some("FRIENDLY".into()),
            target_audience: Some("beginners".into()),
            ..ProjectSettings::default()
        };
        let outline = parse_outline("# Guide\n## Intro");
        let messages = draft_messages(&sample_brief(), &outline, Some(&settings));

        assert!(messages[0].content.contains("Write in a friendly tone"));
        let user = &messages[1].content;
        assert!(user.contains("# Guide\n## Intro\n"));
        assert!(user.contains("- Sizing guide: /sizing"));
        assert!(user.contains("- https://example.com/study"));
        assert!(user.contains("appropriate for beginners"));
    }

    #[tokio::test]
    async fn draft_budget_is_twice_the_word_count() {
        let provider = Recorder {
            reply: "# Title\nBody".into(),
            seen: Mutex::new(Vec::new()),
        };
        let brief = sample_brief();
        let markdown = generate_draft(&provider, &brief, &[], None).await.unwrap();
        assert_eq!(markdown, "# Title\nBody");

        let outline = generate_outline(&provider, &brief, None).await.unwrap();
        assert_eq!(outline[0].heading, "Title");

        let seen = provider.seen.lock().unwrap();
        assert_eq!(seen[0].1.max_tokens, 2400);
        assert_eq!(seen[1].1.max_tokens, OUTLINE_MAX_TOKENS);
    }
}
