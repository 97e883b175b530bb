//! Composer: Selection -> RenderedArtifact.
//!
//! Deterministic for a given Selection, profile and run date. The composer
//! fills the presentation fields that are still missing (read time, tracked
//! link) on the Selection itself, groups full-tier items by category, and
//! renders through a [`Renderer`]. Fields already set upstream or by a
//! healer are never overwritten.

pub mod render;
pub mod tracking;

use chrono::NaiveDate;
use tracing::debug;

use crate::config::BrandConfig;
use crate::domain::{RenderedArtifact, SegmentProfile, SelectedItem, Selection, Tier};

pub use render::{HtmlRenderer, RenderContext, RenderItem, RenderSection, Renderer};
pub use tracking::{tracked_link, tracked_target, NO_OP_LINK, TITLE_LIMIT};

/// Section order for full-tier items. Unknown categories follow, in order of
/// first appearance.
pub const CATEGORY_PRIORITY: [&str; 6] = [
    "🚀 AI & Innovation",
    "💼 Tech Business",
    "☁️ Enterprise Tech",
    "🔐 Security",
    "💰 Funding & M&A",
    "📊 Market Trends",
];

/// Heading for items with no category tag.
pub const DEFAULT_CATEGORY: &str = "📰 Top Stories";

const WORDS_PER_MINUTE: f64 = 200.0;
const MAX_READ_MINUTES: u32 = 15;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ComposeError {
    #[error("rendered output is missing required sections: {}", .0.join(", "))]
    MissingRequiredSection(Vec<String>),

    #[error("render failed: {0}")]
    Render(String),

    #[error("invalid tracking base URL {0}")]
    InvalidTrackingBase(String),
}

/// Minutes to read `words` words at 200 wpm, clamped to 1..=15.
pub fn calculate_read_time(words: usize) -> u32 {
    if words == 0 {
        return 1;
    }
    let minutes = (words as f64 / WORDS_PER_MINUTE).round() as u32;
    minutes.clamp(1, MAX_READ_MINUTES)
}

pub struct Composer {
    brand: BrandConfig,
    renderer: Box<dyn Renderer>,
}

impl Composer {
    pub fn new(brand: BrandConfig) -> Self {
        Self {
            brand,
            renderer: Box::new(HtmlRenderer),
        }
    }

    pub fn with_renderer(mut self, renderer: Box<dyn Renderer>) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn brand(&self) -> &BrandConfig {
        &self.brand
    }

    /// Fill missing presentation fields on `selection` and render it.
    pub fn compose(
        &self,
        selection: &mut Selection,
        profile: &SegmentProfile,
        run_date: NaiveDate,
    ) -> Result<RenderedArtifact, ComposeError> {
        for entry in selection.items.iter_mut() {
            self.annotate(entry, &selection.segment_id, run_date)?;
        }

        let context = self.context(selection, profile, run_date);
        let body = self.renderer.render(&context)?;
        self.check_footer(&body)?;

        let artifact = RenderedArtifact::new(selection.segment_id.clone(), run_date, body);
        debug!(
            segment_id = %artifact.segment_id,
            bytes = artifact.byte_size,
            sections = context.sections.len(),
            "composer: artifact rendered"
        );
        Ok(artifact)
    }

    fn annotate(
        &self,
        entry: &mut SelectedItem,
        segment_id: &str,
        run_date: NaiveDate,
    ) -> Result<(), ComposeError> {
        if entry.valid_read_time().is_none() {
            let words = entry.item.word_count();
            let minutes = calculate_read_time(words);
            debug!(item = %entry.id().short(), words, minutes, "composer: read time filled");
            entry.read_time_minutes = Some(minutes);
        }
        if entry.tracked_url.is_none() {
            entry.tracked_url = Some(tracked_link(
                &self.brand.tracking_base_url,
                &entry.item.url,
                segment_id,
                run_date,
                &entry.item.title,
            )?);
        }
        Ok(())
    }

    fn context(
        &self,
        selection: &Selection,
        profile: &SegmentProfile,
        run_date: NaiveDate,
    ) -> RenderContext {
        let full: Vec<&SelectedItem> = selection.in_tier(Tier::Full).collect();
        RenderContext {
            newsletter_name: self.brand.newsletter_name.clone(),
            segment_name: profile.display_name(),
            segment_description: profile.description.clone(),
            iso_date: run_date.format("%Y-%m-%d").to_string(),
            long_date: run_date.format("%B %d, %Y").to_string(),
            sections: group_by_category(&full),
            quick_links: selection.in_tier(Tier::Quick).map(render_item).collect(),
            trending: selection.in_tier(Tier::Trending).map(render_item).collect(),
            items_scanned: selection.pool_size,
            items_selected: selection.len(),
            website_url: self.brand.website_url.clone(),
            unsubscribe_url: self.brand.unsubscribe_url.clone(),
        }
    }

    /// Legal footer elements that must survive rendering.
    fn check_footer(&self, body: &str) -> Result<(), ComposeError> {
        let required = [
            "Unsubscribe",
            self.brand.newsletter_name.as_str(),
            self.brand.website_url.as_str(),
            self.brand.unsubscribe_url.as_str(),
        ];
        let mut missing = Vec::new();
        for needle in required {
            if needle.is_empty() {
                continue;
            }
            if !body.contains(needle) && !body.contains(render::escape(needle).as_str()) {
                missing.push(needle.to_string());
            }
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(ComposeError::MissingRequiredSection(missing))
        }
    }
}

fn render_item(entry: &SelectedItem) -> RenderItem {
    RenderItem {
        title: entry.item.title.clone(),
        link: entry
            .tracked_url
            .clone()
            .unwrap_or_else(|| NO_OP_LINK.to_string()),
        source: entry.item.source.clone(),
        summary: entry.summary.clone(),
        read_time_minutes: entry.valid_read_time().unwrap_or(1),
        category_tag: entry.category_tag.clone(),
    }
}

/// Group by category tag, ordered by [`CATEGORY_PRIORITY`]; unknown tags last,
/// stable by first appearance.
fn group_by_category(items: &[&SelectedItem]) -> Vec<RenderSection> {
    let mut sections: Vec<RenderSection> = Vec::new();
    for entry in items {
        let tag = entry.category_tag.trim();
        let category = if tag.is_empty() { DEFAULT_CATEGORY } else { tag };
        match sections.iter_mut().find(|s| s.category == category) {
            Some(section) => section.items.push(render_item(entry)),
            None => sections.push(RenderSection {
                category: category.to_string(),
                items: vec![render_item(entry)],
            }),
        }
    }
    sections.sort_by_key(|s| {
        CATEGORY_PRIORITY
            .iter()
            .position(|c| *c == s.category)
            .unwrap_or(CATEGORY_PRIORITY.len())
    });
    sections
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Item;
    use chrono::Utc;

    fn entry(title: &str, tag: &str) -> SelectedItem {
        let item = Item::new(format!("https://example.com/{title}"), title, "Blog", "ai", Utc::now());
        SelectedItem::new(item, Tier::Full, tag, 8)
    }

    #[test]
    fn test_read_time_rule() {
        assert_eq!(calculate_read_time(0), 1);
        assert_eq!(calculate_read_time(50), 1);
        assert_eq!(calculate_read_time(700), 4);
        assert_eq!(calculate_read_time(1400), 7);
        assert_eq!(calculate_read_time(100_000), 15);
    }

    #[test]
    fn test_sections_follow_priority_then_first_appearance() {
        let a = entry("a", "🗞️ Policy");
        let b = entry("b", "🔐 Security");
        let c = entry("c", "");
        let d = entry("d", "🚀 AI & Innovation");
        let e = entry("e", "🔐 Security");
        let sections = group_by_category(&[&a, &b, &c, &d, &e]);
        let order: Vec<&str> = sections.iter().map(|s| s.category.as_str()).collect();
        assert_eq!(
            order,
            vec!["🚀 AI & Innovation", "🔐 Security", "🗞️ Policy", DEFAULT_CATEGORY]
        );
        assert_eq!(sections[1].items.len(), 2);
    }

    #[test]
    fn test_footer_check_names_missing_elements() {
        struct Bare;
        impl Renderer for Bare {
            fn render(&self, _: &RenderContext) -> Result<String, ComposeError> {
                Ok("<html>Brief Delights</html>".to_string())
            }
        }
        let composer = Composer::new(BrandConfig::default()).with_renderer(Box::new(Bare));
        let mut selection = Selection::new("builders", vec![entry("a", "🔐 Security")]);
        let profile = SegmentProfile::new("builders", "Builders", "d");
        let date = NaiveDate::from_ymd_opt(2026, 10, 18).expect("date");
        let err = composer.compose(&mut selection, &profile, date).unwrap_err();
        match err {
            ComposeError::MissingRequiredSection(missing) => {
                assert!(missing.contains(&"Unsubscribe".to_string()));
                assert!(!missing.contains(&"Brief Delights".to_string()));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
