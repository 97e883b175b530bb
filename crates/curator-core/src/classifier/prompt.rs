//! Selection request construction.

use crate::composer::CATEGORY_PRIORITY;
use crate::domain::{Item, SegmentProfile};

/// Description characters sent per candidate.
const DESCRIPTION_CHARS: usize = 300;

/// Build the selection request for one segment.
///
/// The request carries the segment's criteria, per-tier targets, the ranking
/// rubric and the candidate batch, and asks for a bare JSON object back.
pub fn selection_prompt(profile: &SegmentProfile, candidates: &[Item]) -> String {
    let name = &profile.name;
    let targets = &profile.targets;
    let bounds = &profile.bounds;
    let mut out = String::new();

    out.push_str(&format!(
        "You are curating today's digest for the \"{}\" segment.\n",
        profile.display_name()
    ));
    out.push_str(&format!("\nAUDIENCE: {}\n", profile.description));
    if !profile.selection_criteria.trim().is_empty() {
        out.push_str(&format!(
            "\nSEGMENT CRITERIA:\n{}\n",
            profile.selection_criteria.trim()
        ));
    }
    if !profile.focus_keywords.is_empty() {
        out.push_str(&format!("\nFOCUS ON: {}\n", profile.focus_keywords.join(", ")));
    }
    if !profile.skip_keywords.is_empty() {
        out.push_str(&format!("SKIP: {}\n", profile.skip_keywords.join(", ")));
    }

    out.push_str(&format!(
        "\nReview the {} candidates below and select {} items in three tiers:\n",
        candidates.len(),
        targets.total()
    ));
    out.push_str(&format!(
        "- \"full\" ({} items): breaking news and deep analysis with real impact. Urgency 8-10.\n",
        targets.full
    ));
    out.push_str(&format!(
        "- \"quick\" ({} items): tools, releases and guides worth a one-line mention. Urgency 6-7.\n",
        targets.quick
    ));
    out.push_str(&format!(
        "- \"trending\" ({} items): discussions and repos generating buzz. Urgency 5-8.\n",
        targets.trending
    ));
    out.push_str(&format!(
        "\nHARD LIMITS: between {} and {} items in total, at least {} full, {} quick and {} trending.\n",
        bounds.min_total, bounds.max_total, bounds.min_full, bounds.min_quick, bounds.min_trending
    ));

    out.push_str(
        "\nRANKING:\n\
         - Primary sources (official announcements, papers, release notes, engineering blogs) \
         outrank secondary coverage of someone else's news.\n\
         - Secondary coverage is only worth a slot when it adds a unique angle.\n\
         - Boost items whose trending signal is verified (on the discussion site with more than 15 comments), \
         especially for the trending tier.\n\
         - Cover several sub-topics rather than one story from many angles.\n",
    );

    out.push_str("\nFor every selected item provide:\n");
    out.push_str("- item_id: the candidate ID, copied exactly\n");
    out.push_str("- tier: \"full\" | \"quick\" | \"trending\"\n");
    out.push_str(&format!("- selection_reason: one sentence on why {name} needs this\n"));
    out.push_str(&format!("- audience_value: what {name} gains from it specifically\n"));
    out.push_str("- urgency_score: integer 1-10\n");
    out.push_str(&format!(
        "- category_tag: one of {}\n",
        CATEGORY_PRIORITY
            .iter()
            .map(|c| format!("\"{c}\""))
            .collect::<Vec<_>>()
            .join(", ")
    ));

    out.push_str("\nCANDIDATES:\n");
    for (n, item) in candidates.iter().enumerate() {
        out.push_str(&candidate_block(n + 1, item));
    }

    out.push_str(&format!(
        "\nReturn ONLY a JSON object, no Markdown and no commentary:\n\
         {{\"segment\": \"{}\", \"selected_items\": [{{\"item_id\": \"...\", \"tier\": \"full\", \
         \"selection_reason\": \"...\", \"audience_value\": \"...\", \"urgency_score\": 9, \
         \"category_tag\": \"{}\"}}]}}\n",
        profile.id, CATEGORY_PRIORITY[0]
    ));
    out
}

fn candidate_block(n: usize, item: &Item) -> String {
    let description: String = item.description.chars().take(DESCRIPTION_CHARS).collect();
    let mut out = format!(
        "\n#{n}\nID: {}\nTitle: {}\nSource: {} ({})\nCategory: {}\nPublished: {}\n",
        item.id,
        item.title,
        item.source,
        item.authority.as_str(),
        item.category,
        item.published_at.to_rfc3339()
    );
    if !description.is_empty() {
        out.push_str(&format!("Description: {description}\n"));
    }
    if item.has_url() {
        out.push_str(&format!("URL: {}\n", item.url));
    }
    if let Some(signal) = item.trending {
        out.push_str(&format!(
            "Trending: on_discussion_site={} comments={}{}\n",
            signal.on_discussion_site,
            signal.comment_count,
            if signal.is_verified() { " (verified)" } else { "" }
        ));
    }
    out
}

/// Follow-up message telling the service exactly what was wrong with its
/// previous answer.
pub fn corrective_prompt(problems: &[String]) -> String {
    let mut out = String::from("Your previous selection was rejected:\n");
    for problem in problems {
        out.push_str(&format!("- {problem}\n"));
    }
    out.push_str(
        "Fix these problems and return the complete selection again as a single JSON object \
         in the same format. Use only candidate IDs from the list.",
    );
    out
}
