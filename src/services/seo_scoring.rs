//! On-page SEO scoring.
//!
//! Scores a markdown article against a fixed checklist of weighted heuristics:
//!
//! | Check               | Max |
//! |---------------------|-----|
//! | Title length        | 10  |
//! | Word count          | 15  |
//! | Heading hierarchy   | 15  |
//! | Sentence length     | 10  |
//! | Paragraph structure | 10  |
//! | Links               | 10  |
//! | Entity coverage     | 15  |
//! | FAQ section         | 10  |
//! | Images              | 5   |
//!
//! The entity check only produces a checklist item when the brief lists entities, but
//! its 15 points are always part of the maximum.

use regex::Regex;
use serde::Serialize;
use serde_json::{Value, json};
use std::sync::LazyLock;

use crate::models::brief::{ContentBrief, array_len, entity_terms};
use crate::models::draft::count_words;

static H1_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^#\s+.+$").unwrap());
static H2_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^##\s+.+$").unwrap());
static H3_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^###\s+.+$").unwrap());
static SENTENCE_SPLIT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[.!?]+").unwrap());
static PARAGRAPH_SPLIT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n\n+").unwrap());
static LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\]]+)\]\(([^)]+)\)").unwrap());
static IMAGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"!\[([^\]]*)\]\(([^)]+)\)").unwrap());

const DEFAULT_TARGET_WORDS: i32 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Pass,
    Warning,
    Fail,
}

/// One line of the on-page checklist.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChecklistItem {
    pub category: &'static str,
    pub label: &'static str,
    pub status: CheckStatus,
    pub score: u32,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChecklistSummary {
    pub passed: usize,
    pub warnings: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeoAnalysis {
    /// 0-100
    pub score: i32,
    pub checklist: Vec<ChecklistItem>,
    pub summary: ChecklistSummary,
}

impl SeoAnalysis {
    /// JSON stored in `content_drafts.onpage_checklist`.
    pub fn to_checklist_json(&self) -> Value {
        json!({
            "checklist": self.checklist,
            "summary": self.summary,
            "last_calculated": chrono::Utc::now().to_rfc3339(),
        })
    }
}

/// The parts of a brief the scorer looks at.
#[derive(Debug, Clone, Default)]
pub struct BriefTargets {
    pub entities: Vec<String>,
    pub faq_count: usize,
    pub recommended_word_count: Option<i32>,
}

impl From<&ContentBrief> for BriefTargets {
    fn from(brief: &ContentBrief) -> Self {
        Self {
            entities: entity_terms(&brief.entities),
            faq_count: array_len(&brief.faq),
            recommended_word_count: brief.recommended_word_count,
        }
    }
}

struct Scorecard {
    items: Vec<ChecklistItem>,
    total: u32,
    max: u32,
}

impl Scorecard {
    fn new() -> Self {
        Self {
            items: Vec::new(),
            total: 0,
            max: 0,
        }
    }

    fn push(
        &mut self,
        category: &'static str,
        label: &'static str,
        status: CheckStatus,
        score: u32,
        message: String,
    ) {
        self.total += score;
        self.items.push(ChecklistItem {
            category,
            label,
            status,
            score,
            message,
        });
    }
}

/// Score a markdown article.
///
/// `title` is the draft title; `brief` supplies the target length, entities and FAQ.
pub fn calculate_seo_score(
    markdown: &str,
    title: Option<&str>,
    brief: Option<&BriefTargets>,
) -> SeoAnalysis {
    let mut card = Scorecard::new();
    let word_count = count_words(markdown).max(0) as usize;

    check_title(&mut card, title);
    check_word_count(&mut card, word_count, brief);
    check_headings(&mut card, markdown);
    check_sentences(&mut card, markdown, word_count);
    check_paragraphs(&mut card, markdown, word_count);
    check_links(&mut card, markdown);
    check_entities(&mut card, markdown, brief);
    check_faq(&mut card, markdown, brief);
    check_images(&mut card, markdown);

    let score = if card.max > 0 {
        (card.total as f64 / card.max as f64 * 100.0).round() as i32
    } else {
        0
    };

    let summary = ChecklistSummary {
        passed: count_status(&card.items, CheckStatus::Pass),
        warnings: count_status(&card.items, CheckStatus::Warning),
        failed: count_status(&card.items, CheckStatus::Fail),
    };

    SeoAnalysis {
        score,
        checklist: card.items,
        summary,
    }
}

fn count_status(items: &[ChecklistItem], status: CheckStatus) -> usize {
    items.iter().filter(|i| i.status == status).count()
}

fn check_title(card: &mut Scorecard, title: Option<&str>) {
    card.max += 10;
    match title.filter(|t| !t.is_empty()) {
        Some(t) => {
            let len = t.chars().count();
            if (30..=60).contains(&len) {
                card.push(
                    "Metadata",
                    "Title Length",
                    CheckStatus::Pass,
                    10,
                    format!("Title is {len} characters (optimal: 30-60)"),
                );
            } else {
                card.push(
                    "Metadata",
                    "Title Length",
                    CheckStatus::Warning,
                    5,
                    format!("Title is {len} characters (recommended: 30-60)"),
                );
            }
        }
        None => card.push(
            "Metadata",
            "Title",
            CheckStatus::Fail,
            0,
            "No title provided".to_string(),
        ),
    }
}

fn check_word_count(card: &mut Scorecard, word_count: usize, brief: Option<&BriefTargets>) {
    card.max += 15;
    let target = brief
        .and_then(|b| b.recommended_word_count)
        .filter(|n| *n > 0)
        .unwrap_or(DEFAULT_TARGET_WORDS);
    let words = word_count as f64;

    if words >= f64::from(target) * 0.8 {
        card.push(
            "Content",
            "Word Count",
            CheckStatus::Pass,
            15,
            format!("{word_count} words (target: {target})"),
        );
    } else if words >= f64::from(target) * 0.5 {
        card.push(
            "Content",
            "Word Count",
            CheckStatus::Warning,
            8,
            format!("{word_count} words (target: {target})"),
        );
    } else {
        card.push(
            "Content",
            "Word Count",
            CheckStatus::Fail,
            0,
            format!("Only {word_count} words (target: {target})"),
        );
    }
}

fn check_headings(card: &mut Scorecard, markdown: &str) {
    card.max += 15;
    let h1 = H1_RE.find_iter(markdown).count();
    let h2 = H2_RE.find_iter(markdown).count();
    let h3 = H3_RE.find_iter(markdown).count();

    if h1 == 1 && h2 >= 3 {
        card.push(
            "Structure",
            "Heading Hierarchy",
            CheckStatus::Pass,
            15,
            format!("Good structure: 1 H1, {h2} H2s, {h3} H3s"),
        );
    } else if h1 >= 1 && h2 >= 1 {
        card.push(
            "Structure",
            "Heading Hierarchy",
            CheckStatus::Warning,
            8,
            format!("{h1} H1, {h2} H2s - consider adding more H2s"),
        );
    } else {
        card.push(
            "Structure",
            "Heading Hierarchy",
            CheckStatus::Fail,
            0,
            "Missing proper heading structure".to_string(),
        );
    }
}

fn check_sentences(card: &mut Scorecard, markdown: &str, word_count: usize) {
    card.max += 10;
    let sentences = SENTENCE_SPLIT_RE
        .split(markdown)
        .filter(|s| !s.trim().is_empty())
        .count();
    let avg = if sentences > 0 {
        word_count as f64 / sentences as f64
    } else {
        0.0
    };

    if (10.0..=20.0).contains(&avg) {
        card.push(
            "Readability",
            "Sentence Length",
            CheckStatus::Pass,
            10,
            format!("Avg {avg:.1} words/sentence (optimal: 10-20)"),
        );
    } else if avg > 0.0 {
        card.push(
            "Readability",
            "Sentence Length",
            CheckStatus::Warning,
            5,
            format!("Avg {avg:.1} words/sentence"),
        );
    } else {
        card.push(
            "Readability",
            "Sentence Length",
            CheckStatus::Fail,
            0,
            "No sentences detected".to_string(),
        );
    }
}

fn check_paragraphs(card: &mut Scorecard, markdown: &str, word_count: usize) {
    card.max += 10;
    let paragraphs = PARAGRAPH_SPLIT_RE
        .split(markdown)
        .filter(|p| !p.trim().is_empty() && !p.starts_with('#'))
        .count();
    let avg = if paragraphs > 0 {
        word_count as f64 / paragraphs as f64
    } else {
        0.0
    };

    if paragraphs >= 5 && avg <= 150.0 {
        card.push(
            "Readability",
            "Paragraph Structure",
            CheckStatus::Pass,
            10,
            format!("{paragraphs} paragraphs, avg {avg:.0} words"),
        );
    } else if paragraphs >= 3 {
        card.push(
            "Readability",
            "Paragraph Structure",
            CheckStatus::Warning,
            5,
            format!("{paragraphs} paragraphs - consider breaking up longer ones"),
        );
    } else {
        card.push(
            "Readability",
            "Paragraph Structure",
            CheckStatus::Fail,
            0,
            "Too few paragraphs".to_string(),
        );
    }
}

fn check_links(card: &mut Scorecard, markdown: &str) {
    card.max += 10;
    let links = LINK_RE.find_iter(markdown).count();

    if links >= 3 {
        card.push(
            "Links",
            "Internal Links",
            CheckStatus::Pass,
            10,
            format!("{links} internal links"),
        );
    } else if links >= 1 {
        card.push(
            "Links",
            "Internal Links",
            CheckStatus::Warning,
            5,
            format!("{links} links - add more for better SEO"),
        );
    } else {
        card.push(
            "Links",
            "Internal Links",
            CheckStatus::Fail,
            0,
            "No internal links found".to_string(),
        );
    }
}

fn check_entities(card: &mut Scorecard, markdown: &str, brief: Option<&BriefTargets>) {
    card.max += 15;
    let Some(entities) = brief.map(|b| &b.entities).filter(|e| !e.is_empty()) else {
        return;
    };

    let haystack = markdown.to_lowercase();
    let covered = entities
        .iter()
        .filter(|e| haystack.contains(&e.to_lowercase()))
        .count();
    let total = entities.len();
    let coverage = covered as f64 / total as f64 * 100.0;

    if coverage >= 80.0 {
        card.push(
            "Content",
            "Entity Coverage",
            CheckStatus::Pass,
            15,
            format!("{covered}/{total} entities covered ({coverage:.0}%)"),
        );
    } else if coverage >= 50.0 {
        card.push(
            "Content",
            "Entity Coverage",
            CheckStatus::Warning,
            8,
            format!("{covered}/{total} entities covered ({coverage:.0}%)"),
        );
    } else {
        card.push(
            "Content",
            "Entity Coverage",
            CheckStatus::Fail,
            0,
            format!("Only {covered}/{total} entities covered"),
        );
    }
}

fn check_faq(card: &mut Scorecard, markdown: &str, brief: Option<&BriefTargets>) {
    card.max += 10;
    let lower = markdown.to_lowercase();
    let marked = lower.contains("faq") || lower.contains("frequently asked questions");
    let faq_count = brief.map_or(0, |b| b.faq_count);

    if faq_count == 0 {
        card.push(
            "Content",
            "FAQ Section",
            CheckStatus::Warning,
            5,
            "No FAQs in brief".to_string(),
        );
    } else if marked {
        card.push(
            "Content",
            "FAQ Section",
            CheckStatus::Pass,
            10,
            format!("FAQ section included with {faq_count} questions"),
        );
    } else {
        card.push(
            "Content",
            "FAQ Section",
            CheckStatus::Warning,
            5,
            "Brief has FAQs but not clearly marked in content".to_string(),
        );
    }
}

fn check_images(card: &mut Scorecard, markdown: &str) {
    card.max += 5;
    let images = IMAGE_RE.find_iter(markdown).count();

    match images {
        0 => card.push(
            "Media",
            "Images",
            CheckStatus::Warning,
            0,
            "No images found".to_string(),
        ),
        1 => card.push(
            "Media",
            "Images",
            CheckStatus::Warning,
            3,
            "1 image - consider adding more".to_string(),
        ),
        n => card.push(
            "Media",
            "Images",
            CheckStatus::Pass,
            5,
            format!("{n} images included"),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn item<'a>(analysis: &'a SeoAnalysis, label: &str) -> &'a ChecklistItem {
        analysis
            .checklist
            .iter()
            .find(|i| i.label == label)
            .unwrap_or_else(|| panic!("missing checklist item {label}"))
    }

    fn sentence_block(sentences: usize) -> String {
        // Twelve words per sentence
        "Trail running shoes need grip and cushioning for long rocky mountain routes. "
            .repeat(sentences)
    }

    fn strong_article() -> String {
        let mut md = String::from("# The Complete Guide To Choosing Trail Running Shoes\n\n");
        for section in ["Cushioning", "Grip", "Fit"] {
            md.push_str(&format!("## {section}\n\n"));
            md.push_str(&sentence_block(5));
            md.push_str("\n\n");
            md.push_str(&sentence_block(5));
            md.push_str("\n\n");
        }
        md.push_str("## FAQ\n\nSee [grip](/grip), [fit](/fit) and [care](/care) for more.\n\n");
        md.push_str("![shoe](a.png) ![sole](b.png)\n");
        md
    }

    #[test]
    fn empty_document_scores_low_but_always_lists_core_checks() {
        let analysis = calculate_seo_score("", None, None);

        let labels: Vec<_> = analysis.checklist.iter().map(|i| i.label).collect();
        assert_eq!(
            labels,
            vec![
                "Title",
                "Word Count",
                "Heading Hierarchy",
                "Sentence Length",
                "Paragraph Structure",
                "Internal Links",
                "FAQ Section",
                "Images",
            ]
        );
        // Only the FAQ warning (5 points) out of 100
        assert_eq!(analysis.score, 5);
        assert_eq!(
            analysis.summary,
            ChecklistSummary {
                passed: 0,
                warnings: 2,
                failed: 6
            }
        );
    }

    #[test]
    fn title_length_bands() {
        let ok = calculate_seo_score("", Some(&"a".repeat(45)), None);
        assert_eq!(item(&ok, "Title Length").status, CheckStatus::Pass);

        let short = calculate_seo_score("", Some("Short"), None);
        let title = item(&short, "Title Length");
        assert_eq!(title.status, CheckStatus::Warning);
        assert_eq!(title.score, 5);
        assert_eq!(title.message, "Title is 5 characters (recommended: 30-60)");
    }

    #[test]
    fn word_count_uses_brief_target() {
        let brief = BriefTargets {
            recommended_word_count: Some(10),
            ..Default::default()
        };
        let analysis = calculate_seo_score("one two three four five six", None, Some(&brief));
        let words = item(&analysis, "Word Count");
        assert_eq!(words.status, CheckStatus::Warning);
        assert_eq!(words.score, 8);
        assert_eq!(words.message, "6 words (target: 10)");
    }

    #[test]
    fn heading_hierarchy_counts_levels_separately() {
        let md = "# Title\n\n## A\n\n## B\n\n### B1\n\n## C\n";
        let analysis = calculate_seo_score(md, None, None);
        let headings = item(&analysis, "Heading Hierarchy");
        assert_eq!(headings.status, CheckStatus::Pass);
        assert_eq!(headings.message, "Good structure: 1 H1, 3 H2s, 1 H3s");

        let md = "# One\n\n# Two\n\n## A\n";
        let analysis = calculate_seo_score(md, None, None);
        assert_eq!(item(&analysis, "Heading Hierarchy").score, 8);
    }

    #[test]
    fn images_also_count_as_links() {
        let md = "![a](1.png) and ![b](2.png) and [c](/c)";
        let analysis = calculate_seo_score(md, None, None);
        assert_eq!(item(&analysis, "Images").status, CheckStatus::Pass);
        assert_eq!(item(&analysis, "Internal Links").status, CheckStatus::Pass);
    }

    #[test]
    fn entity_coverage_is_case_insensitive() {
        let brief = BriefTargets {
            entities: vec!["Vibram".into(), "rock plate".into(), "gaiters".into()],
            ..Default::default()
        };
        let analysis = calculate_seo_score(
            "Soles by VIBRAM often include a Rock Plate.",
            None,
            Some(&brief),
        );
        let entities = item(&analysis, "Entity Coverage");
        assert_eq!(entities.status, CheckStatus::Warning);
        assert_eq!(entities.message, "2/3 entities covered (67%)");
    }

    #[test]
    fn faq_marker_needs_brief_questions() {
        let brief = BriefTargets {
            faq_count: 2,
            ..Default::default()
        };
        let marked = calculate_seo_score("## Frequently Asked Questions", None, Some(&brief));
        assert_eq!(item(&marked, "FAQ Section").score, 10);

        let unmarked = calculate_seo_score("## Questions", None, Some(&brief));
        assert_eq!(item(&unmarked, "FAQ Section").score, 5);
        assert_eq!(item(&unmarked, "FAQ Section").status, CheckStatus::Warning);
    }

    #[test]
    fn strong_article_scores_high_and_stays_in_range() {
        let brief = BriefTargets {
            entities: vec!["cushioning".into(), "grip".into()],
            faq_count: 3,
            recommended_word_count: Some(300),
        };
        let title = "The Complete Guide To Choosing Trail Running Shoes";
        let analysis = calculate_seo_score(&strong_article(), Some(title), Some(&brief));

        assert!(analysis.score <= 100);
        assert!(analysis.score >= 90, "score was {}", analysis.score);
        assert_eq!(analysis.summary.failed, 0);
    }

    #[test]
    fn checklist_json_carries_summary_and_timestamp() {
        let analysis = calculate_seo_score("# Hi", Some("Hi"), None);
        let json = analysis.to_checklist_json();
        assert!(json["checklist"].is_array());
        assert_eq!(json["summary"]["failed"], analysis.summary.failed);
        assert!(json["last_calculated"].is_string());
    }
}
