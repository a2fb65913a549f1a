//! Internal link suggestions between drafts of the same project.
//!
//! Candidates are scored by token overlap (Jaccard) of title, target keyword and body,
//! blended with overlap of the briefs' entities. Targets the writer dismissed before
//! are penalised rather than excluded; targets already linked are skipped.

use std::collections::{HashMap, HashSet};

use serde_json::Value;
use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    models::{
        brief::entity_terms,
        draft::{ContentDraft, count_words},
        link::{GraphRecomputeResult, GraphStats, LinkGraphNode, LinkSuggestion, SuggestionFilter},
    },
};

/// Suggestions at or below this score are dropped.
pub const MIN_RELEVANCE: f64 = 0.12;
pub const DEFAULT_SUGGESTION_LIMIT: usize = 5;
pub const MAX_SUGGESTION_LIMIT: usize = 10;
const MAX_CANDIDATES: i64 = 100;
const TOKEN_WEIGHT: f64 = 0.6;
const ENTITY_WEIGHT: f64 = 0.4;
const DISMISSED_PENALTY: f64 = 0.75;

/// Lowercase, replace anything but `[a-z0-9]` and whitespace with spaces, keep tokens
/// longer than three characters.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c.is_whitespace() {
                c
            } else {
                ' '
            }
        })
        .collect::<String>()
        .split_whitespace()
        .filter(|t| t.len() > 3)
        .map(str::to_string)
        .collect()
}

/// Relevance of `target` as a link destination from `source`, in `[0, 1]`.
///
/// `0.6 * token_jaccard + 0.4 * (shared entities / source entities)`, times 0.75 when the
/// pair was dismissed before. Zero when either side has no tokens.
///
/// Token overlap is a plain set Jaccard: a token repeated in the target counts once toward
/// the shared total. Do not switch to counting target occurrences; that lets repetitive
/// drafts outrank focused ones and can push the token score above 1.
pub fn score_similarity(
    source_tokens: &[String],
    target_tokens: &[String],
    source_entities: &[String],
    target_entities: &[String],
    dismissed: bool,
) -> f64 {
    if source_tokens.is_empty() || target_tokens.is_empty() {
        return 0.0;
    }

    let source_set: HashSet<&str> = source_tokens.iter().map(String::as_str).collect();
    let target_set: HashSet<&str> = target_tokens.iter().map(String::as_str).collect();
    let shared = source_set.intersection(&target_set).count();
    let union = source_set.len() + target_set.len() - shared;
    let token_score = shared as f64 / union.max(1) as f64;

    let source_entities: HashSet<String> =
        source_entities.iter().map(|e| e.to_lowercase()).collect();
    let target_entities: HashSet<String> =
        target_entities.iter().map(|e| e.to_lowercase()).collect();
    let shared_entities = target_entities.intersection(&source_entities).count();
    let entity_score = shared_entities as f64 / source_entities.len().max(1) as f64;

    let penalty = if dismissed { DISMISSED_PENALTY } else { 1.0 };
    (token_score * TOKEN_WEIGHT + entity_score * ENTITY_WEIGHT) * penalty
}

/// Round to three decimals for storage.
pub fn round_score(score: f64) -> f64 {
    (score * 1000.0).round() / 1000.0
}

/// Clamp a requested suggestion count to `1..=10`, defaulting to 5.
pub fn clamp_limit(limit: Option<usize>) -> usize {
    limit
        .filter(|n| *n > 0)
        .unwrap_or(DEFAULT_SUGGESTION_LIMIT)
        .min(MAX_SUGGESTION_LIMIT)
}

/// Markdown appended to the source draft when a suggestion is accepted.
/// Anchor for an accepted link: the stored anchor, else the target draft's title,
/// else "Read more".
pub fn link_anchor<'a>(anchor_text: &'a str, target_title: Option<&'a str>) -> &'a str {
    [Some(anchor_text), target_title]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|text| !text.is_empty())
        .unwrap_or("Read more")
}

pub fn append_link_idea(md_body: &str, anchor: &str, to_draft_id: Uuid) -> String {
    let with_link = format!(
        "{md_body}\n\n> Internal link idea: [{anchor}](/dashboard/content/drafts/{to_draft_id})"
    );
    format!("{}\n", with_link.trim_end())
}

/// Text and entities of a draft, as seen by the scorer.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct LinkCandidate {
    pub id: Uuid,
    pub title: Option<String>,
    pub md_body: Option<String>,
    pub keyword: Option<String>,
    pub entities: Option<Value>,
}

impl LinkCandidate {
    fn tokens(&self) -> Vec<String> {
        let text = [
            self.title.as_deref(),
            self.keyword.as_deref(),
            self.md_body.as_deref(),
        ]
        .into_iter()
        .flatten()
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
        tokenize(&text)
    }

    fn entity_list(&self) -> Vec<String> {
        self.entities.as_ref().map(entity_terms).unwrap_or_default()
    }

    /// Title, else target keyword, else a generic label.
    pub fn anchor_text(&self) -> String {
        self.title
            .as_deref()
            .filter(|s| !s.is_empty())
            .or(self.keyword.as_deref().filter(|s| !s.is_empty()))
            .unwrap_or("Related resource")
            .to_string()
    }
}

/// A scored candidate.
#[derive(Debug, Clone)]
pub struct RankedLink {
    pub to_draft_id: Uuid,
    pub anchor_text: String,
    pub score: f64,
}

/// Score, filter and order candidates for `source`.
///
/// Candidates in `accepted` are skipped; those in `dismissed` are penalised.
pub fn rank_candidates(
    source: &LinkCandidate,
    candidates: &[LinkCandidate],
    accepted: &HashSet<Uuid>,
    dismissed: &HashSet<Uuid>,
    limit: usize,
) -> Vec<RankedLink> {
    let source_tokens = source.tokens();
    let source_entities = source.entity_list();

    let mut ranked: Vec<RankedLink> = candidates
        .iter()
        .filter(|c| c.id != source.id && !accepted.contains(&c.id))
        .map(|c| RankedLink {
            to_draft_id: c.id,
            anchor_text: c.anchor_text(),
            score: score_similarity(
                &source_tokens,
                &c.tokens(),
                &source_entities,
                &c.entity_list(),
                dismissed.contains(&c.id),
            ),
        })
        .filter(|r| r.score > MIN_RELEVANCE)
        .collect();

    ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
    ranked.truncate(limit);
    ranked
}

const CANDIDATE_SELECT: &str = r#"
    SELECT d.id, d.title, d.md_body, k.term AS keyword, b.entities
    FROM content_drafts d
    LEFT JOIN content_briefs b ON b.id = d.brief_id
    LEFT JOIN keywords k ON k.id = b.target_keyword_id
"#;

const SUGGESTION_COLUMNS: &str = r#"
    s.id, s.from_draft_id, s.to_draft_id, s.anchor_text, s.relevance_score,
    s.accepted, s.dismissed, s.created_at,
    f.title AS from_draft_title, t.title AS to_draft_title, t.status AS to_draft_status
"#;

/// Replace the draft's open suggestions with a fresh ranking.
///
/// Accepted suggestions are kept; all others (including dismissed ones) are removed
/// before the new set is inserted, in one transaction.
pub async fn suggest_links(
    pool: &DbPool,
    draft_id: Uuid,
    project_id: Uuid,
    limit: usize,
) -> Result<Vec<LinkSuggestion>, AppError> {
    let source = sqlx::query_as::<_, LinkCandidate>(&format!("{CANDIDATE_SELECT} WHERE d.id = $1"))
        .bind(draft_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("Draft"))?;

    let history: Vec<(Uuid, bool, bool)> = sqlx::query_as(
        "SELECT to_draft_id, accepted, dismissed FROM internal_link_suggestions WHERE from_draft_id = $1",
    )
    .bind(draft_id)
    .fetch_all(pool)
    .await?;

    let accepted: HashSet<Uuid> = history.iter().filter(|h| h.1).map(|h| h.0).collect();
    let dismissed: HashSet<Uuid> = history.iter().filter(|h| h.2).map(|h| h.0).collect();

    let candidates = sqlx::query_as::<_, LinkCandidate>(&format!(
        "{CANDIDATE_SELECT}
         WHERE d.project_id = $1 AND d.id <> $2
           AND d.status IN ('READY', 'SCHEDULED', 'EXPORTED', 'PUBLISHED')
         ORDER BY d.updated_at DESC
         LIMIT $3"
    ))
    .bind(project_id)
    .bind(draft_id)
    .bind(MAX_CANDIDATES)
    .fetch_all(pool)
    .await?;

    let ranked = rank_candidates(&source, &candidates, &accepted, &dismissed, limit);

    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM internal_link_suggestions WHERE from_draft_id = $1 AND accepted = false")
        .bind(draft_id)
        .execute(&mut *tx)
        .await?;

    let mut created = Vec::with_capacity(ranked.len());
    for link in &ranked {
        let suggestion = sqlx::query_as::<_, LinkSuggestion>(&format!(
            r#"
            WITH s AS (
                INSERT INTO internal_link_suggestions
                    (from_draft_id, to_draft_id, anchor_text, relevance_score)
                VALUES ($1, $2, $3, $4)
                RETURNING *
            )
            SELECT {SUGGESTION_COLUMNS}
            FROM s
            JOIN content_drafts f ON f.id = s.from_draft_id
            JOIN content_drafts t ON t.id = s.to_draft_id
            "#
        ))
        .bind(draft_id)
        .bind(link.to_draft_id)
        .bind(&link.anchor_text)
        .bind(round_score(link.score))
        .fetch_one(&mut *tx)
        .await?;
        created.push(suggestion);
    }

    tx.commit().await?;

    tracing::info!(%draft_id, count = created.len(), "link suggestions refreshed");

    Ok(created)
}

pub async fn find_suggestion(pool: &DbPool, id: Uuid) -> Result<LinkSuggestion, AppError> {
    sqlx::query_as::<_, LinkSuggestion>(&format!(
        r#"
        SELECT {SUGGESTION_COLUMNS}
        FROM internal_link_suggestions s
        JOIN content_drafts f ON f.id = s.from_draft_id
        JOIN content_drafts t ON t.id = s.to_draft_id
        WHERE s.id = $1
        "#
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::not_found("Suggestion"))
}

/// Suggestions made from one draft, newest first.
pub async fn list_for_draft(
    pool: &DbPool,
    draft_id: Uuid,
    include_dismissed: bool,
) -> Result<Vec<LinkSuggestion>, AppError> {
    let suggestions = sqlx::query_as::<_, LinkSuggestion>(&format!(
        r#"
        SELECT {SUGGESTION_COLUMNS}
        FROM internal_link_suggestions s
        JOIN content_drafts f ON f.id = s.from_draft_id
        JOIN content_drafts t ON t.id = s.to_draft_id
        WHERE s.from_draft_id = $1 AND ($2 OR s.dismissed = false)
        ORDER BY s.created_at DESC
        "#
    ))
    .bind(draft_id)
    .bind(include_dismissed)
    .fetch_all(pool)
    .await?;
    Ok(suggestions)
}

/// Suggestions across a project, filtered by state.
pub async fn list_for_project(
    pool: &DbPool,
    project_id: Uuid,
    filter: SuggestionFilter,
) -> Result<Vec<LinkSuggestion>, AppError> {
    let condition = match filter {
        SuggestionFilter::Pending => "AND s.accepted = false AND s.dismissed = false",
        SuggestionFilter::Accepted => "AND s.accepted = true",
        SuggestionFilter::All => "",
    };

    let suggestions = sqlx::query_as::<_, LinkSuggestion>(&format!(
        r#"
        SELECT {SUGGESTION_COLUMNS}
        FROM internal_link_suggestions s
        JOIN content_drafts f ON f.id = s.from_draft_id
        JOIN content_drafts t ON t.id = s.to_draft_id
        WHERE f.project_id = $1 {condition}
        ORDER BY s.created_at DESC
        "#
    ))
    .bind(project_id)
    .fetch_all(pool)
    .await?;
    Ok(suggestions)
}

/// Accept a suggestion and append the link idea to the source draft.
///
/// Returns the updated suggestion and draft, or `None` for the draft when the
/// suggestion had already been accepted (nothing changes in that case).
pub async fn accept_suggestion(
    pool: &DbPool,
    id: Uuid,
) -> Result<(LinkSuggestion, Option<ContentDraft>), AppError> {
    let mut tx = pool.begin().await?;

    let row: Option<(Uuid, Uuid, String, bool)> = sqlx::query_as(
        "SELECT from_draft_id, to_draft_id, anchor_text, accepted
         FROM internal_link_suggestions WHERE id = $1 FOR UPDATE",
    )
    .bind(id)
    .fetch_optional(&mut *tx)
    .await?;

    let (from_draft_id, to_draft_id, anchor_text, already_accepted) =
        row.ok_or_else(|| AppError::not_found("Suggestion"))?;

    if already_accepted {
        tx.rollback().await?;
        return Ok((find_suggestion(pool, id).await?, None));
    }

    let md_body: Option<String> =
        sqlx::query_scalar("SELECT md_body FROM content_drafts WHERE id = $1 FOR UPDATE")
            .bind(from_draft_id)
            .fetch_one(&mut *tx)
            .await?;

    let target_title: Option<String> =
        sqlx::query_scalar("SELECT title FROM content_drafts WHERE id = $1")
            .bind(to_draft_id)
            .fetch_optional(&mut *tx)
            .await?
            .flatten();

    let anchor = link_anchor(&anchor_text, target_title.as_deref());
    let updated_body = append_link_idea(md_body.as_deref().unwrap_or(""), anchor, to_draft_id);

    sqlx::query("UPDATE internal_link_suggestions SET accepted = true WHERE id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    let draft = sqlx::query_as::<_, ContentDraft>(
        r#"
        UPDATE content_drafts
        SET md_body = $1, word_count = $2, updated_at = NOW()
        WHERE id = $3
        RETURNING *
        "#,
    )
    .bind(&updated_body)
    .bind(count_words(&updated_body))
    .bind(from_draft_id)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok((find_suggestion(pool, id).await?, Some(draft)))
}

pub async fn dismiss_suggestion(pool: &DbPool, id: Uuid) -> Result<LinkSuggestion, AppError> {
    let updated = sqlx::query("UPDATE internal_link_suggestions SET dismissed = true WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?
        .rows_affected();

    if updated == 0 {
        return Err(AppError::not_found("Suggestion"));
    }

    find_suggestion(pool, id).await
}

/// Count accepted, non-dismissed links per draft and replace the project's snapshots.
pub async fn recompute_graph(
    pool: &DbPool,
    project_id: Uuid,
) -> Result<GraphRecomputeResult, AppError> {
    let outgoing: Vec<(Uuid, i64)> = sqlx::query_as(
        r#"
        SELECT s.from_draft_id, COUNT(*)
        FROM internal_link_suggestions s
        JOIN content_drafts f ON f.id = s.from_draft_id
        WHERE f.project_id = $1 AND s.accepted = true AND s.dismissed = false
        GROUP BY s.from_draft_id
        "#,
    )
    .bind(project_id)
    .fetch_all(pool)
    .await?;

    let incoming: Vec<(Uuid, i64)> = sqlx::query_as(
        r#"
        SELECT s.to_draft_id, COUNT(*)
        FROM internal_link_suggestions s
        JOIN content_drafts t ON t.id = s.to_draft_id
        WHERE t.project_id = $1 AND s.accepted = true AND s.dismissed = false
        GROUP BY s.to_draft_id
        "#,
    )
    .bind(project_id)
    .fetch_all(pool)
    .await?;

    let draft_ids: Vec<Uuid> =
        sqlx::query_scalar("SELECT id FROM content_drafts WHERE project_id = $1")
            .bind(project_id)
            .fetch_all(pool)
            .await?;

    let outgoing: HashMap<Uuid, i64> = outgoing.into_iter().collect();
    let incoming: HashMap<Uuid, i64> = incoming.into_iter().collect();

    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM link_graph_snapshots WHERE project_id = $1")
        .bind(project_id)
        .execute(&mut *tx)
        .await?;

    for draft_id in &draft_ids {
        sqlx::query(
            r#"
            INSERT INTO link_graph_snapshots (project_id, draft_id, incoming_count, outgoing_count)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(project_id)
        .bind(draft_id)
        .bind(incoming.get(draft_id).copied().unwrap_or(0) as i32)
        .bind(outgoing.get(draft_id).copied().unwrap_or(0) as i32)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    Ok(GraphRecomputeResult {
        project_id,
        nodes: draft_ids.len(),
        stats: graph_totals(&incoming, &outgoing),
    })
}

fn graph_totals(incoming: &HashMap<Uuid, i64>, outgoing: &HashMap<Uuid, i64>) -> GraphStats {
    GraphStats {
        total_incoming: incoming.values().sum(),
        total_outgoing: outgoing.values().sum(),
    }
}

/// Latest snapshot rows for a project.
pub async fn list_graph(pool: &DbPool, project_id: Uuid) -> Result<Vec<LinkGraphNode>, AppError> {
    let nodes = sqlx::query_as::<_, LinkGraphNode>(
        r#"
        SELECT g.id, g.project_id, g.draft_id, d.title AS draft_title,
               g.incoming_count, g.outgoing_count, g.computed_at
        FROM link_graph_snapshots g
        JOIN content_drafts d ON d.id = g.draft_id
        WHERE g.project_id = $1
        ORDER BY g.incoming_count DESC, g.outgoing_count DESC
        "#,
    )
    .bind(project_id)
    .fetch_all(pool)
    .await?;
    Ok(nodes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn tokens(text: &str) -> Vec<String> {
        tokenize(text)
    }

    fn candidate(title: &str, body: &str, entities: Value) -> LinkCandidate {
        LinkCandidate {
            id: Uuid::new_v4(),
            title: Some(title.to_string()),
            md_body: Some(body.to_string()),
            keyword: None,
            entities: Some(entities),
        }
    }

    #[test]
    fn tokenize_drops_short_tokens_and_punctuation() {
        assert_eq!(
            tokenize("The BEST trail-running shoes, 2025!"),
            vec!["best", "trail", "running", "shoes", "2025"]
        );
        assert!(tokenize("a an the").is_empty());
    }

    #[test]
    fn similarity_is_zero_without_tokens() {
        assert_eq!(score_similarity(&[], &tokens("trail shoes"), &[], &[], false), 0.0);
        assert_eq!(score_similarity(&tokens("trail shoes"), &[], &[], &[], false), 0.0);
    }

    #[test]
    fn repeated_target_tokens_count_once() {
        let source = tokens("trail running shoes");
        let target = tokens("trail running socks");
        let repetitive = tokens("trail trail trail running running socks socks");

        let plain = score_similarity(&source, &target, &[], &[], false);
        let repeated = score_similarity(&source, &repetitive, &[], &[], false);
        assert_eq!(plain, repeated);
        assert!(repeated <= 1.0);
    }

    #[test]
    fn link_anchor_falls_back_to_target_title() {
        assert_eq!(link_anchor("trail shoes", Some("Trail Shoe Guide")), "trail shoes");
        assert_eq!(link_anchor("", Some("Trail Shoe Guide")), "Trail Shoe Guide");
        assert_eq!(link_anchor("  ", Some("Trail Shoe Guide")), "Trail Shoe Guide");
        assert_eq!(link_anchor("", Some("")), "Read more");
        assert_eq!(link_anchor("", None), "Read more");
    }

    #[test]
    fn similarity_blends_tokens_and_entities() {
        let source = tokens("trail running shoes");
        let target = tokens("trail running socks");
        // 2 shared of 4 distinct tokens
        let token_only = score_similarity(&source, &target, &[], &[], false);
        assert!((token_only - 0.3).abs() < 1e-9);

        let entities = vec!["Vibram".to_string(), "gaiters".to_string()];
        let target_entities = vec!["vibram".to_string()];
        let blended = score_similarity(&source, &target, &entities, &target_entities, false);
        assert!((blended - 0.5).abs() < 1e-9);
    }

    #[test]
    fn dismissal_applies_penalty() {
        let source = tokens("trail running shoes");
        let target = tokens("trail running shoes");
        let fresh = score_similarity(&source, &target, &[], &[], false);
        let dismissed = score_similarity(&source, &target, &[], &[], true);
        assert!((dismissed - fresh * 0.75).abs() < 1e-9);
    }

    #[test]
    fn limit_defaults_and_caps() {
        assert_eq!(clamp_limit(None), 5);
        assert_eq!(clamp_limit(Some(0)), 5);
        assert_eq!(clamp_limit(Some(3)), 3);
        assert_eq!(clamp_limit(Some(50)), 10);
    }

    #[test]
    fn anchor_falls_back_to_keyword_then_generic_label() {
        let mut c = candidate("", "", json!([]));
        c.keyword = Some("trail shoes".into());
        assert_eq!(c.anchor_text(), "trail shoes");

        c.keyword = None;
        c.title = None;
        assert_eq!(c.anchor_text(), "Related resource");
    }

    #[test]
    fn ranking_skips_accepted_and_sorts_by_score() {
        let source = candidate(
            "Trail running shoes guide",
            "Choosing trail running shoes for mountain terrain",
            json!(["vibram"]),
        );
        let close = candidate(
            "Trail running shoes review",
            "Testing trail running shoes on mountain terrain",
            json!(["vibram"]),
        );
        let weaker = candidate(
            "Running socks",
            "Socks for trail running",
            json!([]),
        );
        let unrelated = candidate("Sourdough baking", "Flour water yeast", json!([]));
        let linked = candidate(
            "Trail running shoes guide part two",
            "Choosing trail running shoes for mountain terrain",
            json!(["vibram"]),
        );

        let accepted: HashSet<Uuid> = [linked.id].into_iter().collect();
        let ranked = rank_candidates(
            &source,
            &[weaker.clone(), unrelated, close.clone(), linked],
            &accepted,
            &HashSet::new(),
            5,
        );

        let ids: Vec<Uuid> = ranked.iter().map(|r| r.to_draft_id).collect();
        assert_eq!(ids, vec![close.id, weaker.id]);
        assert!(ranked[0].score > ranked[1].score);
        assert_eq!(ranked[0].anchor_text, "Trail running shoes review");
    }

    #[test]
    fn accepted_link_is_appended_once_with_trailing_newline() {
        let to = Uuid::nil();
        let body = append_link_idea("Intro text.\n\n", "Shoe care", to);
        assert_eq!(
            body,
            "Intro text.\n\n\n\n> Internal link idea: [Shoe care](/dashboard/content/drafts/00000000-0000-0000-0000-000000000000)\n"
        );
    }

    #[test]
    fn scores_round_to_three_decimals() {
        assert_eq!(round_score(0.123456), 0.123);
        assert_eq!(round_score(0.9996), 1.0);
    }

    #[test]
    fn graph_totals_sum_both_directions() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let incoming = HashMap::from([(a, 2), (b, 1)]);
        let outgoing = HashMap::from([(a, 3)]);
        assert_eq!(
            graph_totals(&incoming, &outgoing),
            GraphStats {
                total_incoming: 3,
                total_outgoing: 3
            }
        );
    }
}
