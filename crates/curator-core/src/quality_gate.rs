//! Quality Gate: independent, side-effect-free checks over a rendered
//! artifact and the Selection it was composed from.
//!
//! Every check is total and always produces exactly one entry, in a fixed
//! order. The report passes when no entry is a FAIL. Each entry carries a
//! typed [`GateCheck`] so downstream classification never inspects text.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::{Regex, RegexBuilder};
use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::composer::{tracked_target, NO_OP_LINK};
use crate::config::BrandConfig;
use crate::domain::{RenderedArtifact, Selection};

/// Artifacts smaller than this are almost certainly empty renders.
pub const MIN_ARTIFACT_BYTES: usize = 1024;
/// Mail clients clip messages above this size.
pub const CLIP_THRESHOLD_BYTES: usize = 102 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Pass,
    Fail,
    Warn,
}

impl CheckStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CheckStatus::Pass => "PASS",
            CheckStatus::Fail => "FAIL",
            CheckStatus::Warn => "WARN",
        }
    }
}

/// Typed identifier of a gate check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateCheck {
    ArticleLinks,
    ReadTimeVariance,
    SummaryContent,
    TemplateRendering,
    DynamicValues,
    RequiredStructure,
    ArtifactSize,
    HrefValidity,
}

impl GateCheck {
    pub const ALL: [GateCheck; 8] = [
        GateCheck::ArticleLinks,
        GateCheck::ReadTimeVariance,
        GateCheck::SummaryContent,
        GateCheck::TemplateRendering,
        GateCheck::DynamicValues,
        GateCheck::RequiredStructure,
        GateCheck::ArtifactSize,
        GateCheck::HrefValidity,
    ];

    pub fn name(self) -> &'static str {
        match self {
            GateCheck::ArticleLinks => "Article links",
            GateCheck::ReadTimeVariance => "Read time variance",
            GateCheck::SummaryContent => "Summary content",
            GateCheck::TemplateRendering => "Template rendering",
            GateCheck::DynamicValues => "Dynamic values",
            GateCheck::RequiredStructure => "Required structure",
            GateCheck::ArtifactSize => "Artifact size",
            GateCheck::HrefValidity => "Href validity",
        }
    }
}

impl fmt::Display for GateCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckEntry {
    pub status: CheckStatus,
    pub check: GateCheck,
    pub detail: String,
}

impl CheckEntry {
    fn pass(check: GateCheck, detail: impl Into<String>) -> Self {
        Self {
            status: CheckStatus::Pass,
            check,
            detail: detail.into(),
        }
    }

    fn fail(check: GateCheck, detail: impl Into<String>) -> Self {
        Self {
            status: CheckStatus::Fail,
            check,
            detail: detail.into(),
        }
    }

    fn warn(check: GateCheck, detail: impl Into<String>) -> Self {
        Self {
            status: CheckStatus::Warn,
            check,
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub segment_id: String,
    pub run_date: NaiveDate,
    pub entries: Vec<CheckEntry>,
}

impl ValidationReport {
    /// True when no entry is a FAIL.
    pub fn overall_pass(&self) -> bool {
        self.failures().next().is_none()
    }

    pub fn failures(&self) -> impl Iterator<Item = &CheckEntry> {
        self.entries.iter().filter(|e| e.status == CheckStatus::Fail)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &CheckEntry> {
        self.entries.iter().filter(|e| e.status == CheckStatus::Warn)
    }

    /// Distinct failing checks, in check order.
    pub fn failed_checks(&self) -> BTreeSet<GateCheck> {
        self.failures().map(|e| e.check).collect()
    }

    pub fn entry(&self, check: GateCheck) -> Option<&CheckEntry> {
        self.entries.iter().find(|e| e.check == check)
    }

    pub fn status_of(&self, check: GateCheck) -> Option<CheckStatus> {
        self.entry(check).map(|e| e.status)
    }

    /// Plain-text report, one line per check plus a verdict.
    pub fn render_text(&self) -> String {
        let mut out = format!("Quality gate: {} ({})\n", self.segment_id, self.run_date);
        for entry in &self.entries {
            if entry.detail.is_empty() {
                out.push_str(&format!("  {} {}\n", entry.status.as_str(), entry.check));
            } else {
                out.push_str(&format!(
                    "  {} {}: {}\n",
                    entry.status.as_str(),
                    entry.check,
                    entry.detail
                ));
            }
        }
        let failures = self.failures().count();
        let warnings = self.warnings().count();
        if failures == 0 {
            out.push_str(&format!(
                "PASSED ({} checks, {warnings} warnings)\n",
                self.entries.len()
            ));
        } else {
            out.push_str(&format!("FAILED ({failures} failures, {warnings} warnings)\n"));
        }
        out
    }
}

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{[^}]+\}\}").expect("placeholder pattern"))
}

fn href_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"href=["']([^"']+)["']"#).expect("href pattern"))
}

fn stale_value_res() -> &'static [(Regex, &'static str)] {
    static RES: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    RES.get_or_init(|| {
        [
            (r"(?i)1,340\+?\s*news", "Hardcoded '1,340' item count"),
            (r"(?i)~400\s*analyzed", "Hardcoded '~400' enrichment count"),
        ]
        .into_iter()
        .map(|(p, d)| (Regex::new(p).expect("stale value pattern"), d))
        .collect()
    })
}

fn unsubscribe_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)unsubscribe").expect("unsubscribe pattern"))
}

pub struct QualityGate {
    brand_name: String,
    brand_re: Option<Regex>,
}

impl QualityGate {
    pub fn new(brand: &BrandConfig) -> Self {
        let pattern = brand
            .newsletter_name
            .split_whitespace()
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(r"\s*");
        let brand_re = RegexBuilder::new(&pattern)
            .case_insensitive(true)
            .build()
            .ok();
        Self {
            brand_name: brand.newsletter_name.clone(),
            brand_re,
        }
    }

    /// Run every check, in order.
    pub fn validate(&self, artifact: &RenderedArtifact, selection: &Selection) -> ValidationReport {
        let body = artifact.body.as_str();
        let entries = vec![
            check_links(selection),
            check_read_times(selection),
            check_summaries(selection),
            check_placeholders(body),
            check_stale_values(body),
            self.check_structure(body, artifact.run_date),
            check_size(artifact),
            check_hrefs(body),
        ];
        ValidationReport {
            segment_id: artifact.segment_id.clone(),
            run_date: artifact.run_date,
            entries,
        }
    }

    fn brand_present(&self, body: &str) -> bool {
        match &self.brand_re {
            Some(re) => re.is_match(body),
            None => body
                .to_lowercase()
                .contains(&self.brand_name.to_lowercase()),
        }
    }

    fn check_structure(&self, body: &str, run_date: NaiveDate) -> CheckEntry {
        let check = GateCheck::RequiredStructure;
        let mut missing = Vec::new();
        if !unsubscribe_re().is_match(body) {
            missing.push("unsubscribe link");
        }
        if !self.brand_present(body) {
            missing.push("brand footer");
        }
        let date_forms = [
            run_date.format("%Y-%m-%d").to_string(),
            run_date.format("%Y%m%d").to_string(),
            run_date.format("%B %d, %Y").to_string(),
        ];
        if !date_forms.iter().any(|d| body.contains(d.as_str())) {
            missing.push("date");
        }
        if missing.is_empty() {
            CheckEntry::pass(check, "Header, footer and unsubscribe present")
        } else {
            CheckEntry::fail(check, format!("Missing: {}", missing.join(", ")))
        }
    }
}

fn short_title(title: &str) -> String {
    title.chars().take(40).collect()
}

fn check_links(selection: &Selection) -> CheckEntry {
    let check = GateCheck::ArticleLinks;
    let mut broken = Vec::new();
    for entry in &selection.items {
        let title = short_title(&entry.item.title);
        match entry.tracked_url.as_deref().map(str::trim) {
            None | Some("") | Some(NO_OP_LINK) => {
                broken.push(format!("missing tracked link for '{title}'"))
            }
            Some(link) => {
                if tracked_target(link).is_none() {
                    broken.push(format!("no absolute url target in link for '{title}'"));
                }
            }
        }
    }
    if broken.is_empty() {
        CheckEntry::pass(
            check,
            format!("All {} items have valid tracked links", selection.len()),
        )
    } else {
        CheckEntry::fail(check, format!("{} broken: {}", broken.len(), broken[0]))
    }
}

fn check_read_times(selection: &Selection) -> CheckEntry {
    let check = GateCheck::ReadTimeVariance;
    let times: Vec<u32> = selection
        .items
        .iter()
        .map(|i| i.read_time_minutes.unwrap_or(0))
        .collect();
    let n = times.len();
    if n == 0 {
        return CheckEntry::pass(check, "No items");
    }

    let mut counts: BTreeMap<u32, usize> = BTreeMap::new();
    for t in &times {
        *counts.entry(*t).or_default() += 1;
    }
    let (mode, mode_count) = counts
        .iter()
        .max_by_key(|(_, c)| **c)
        .map(|(v, c)| (*v, *c))
        .unwrap_or((0, 0));

    if counts.len() == 1 && n > 2 {
        CheckEntry::fail(
            check,
            format!("All {n} items have identical read time: {mode} min"),
        )
    } else if counts.len() == 1 && n > 1 {
        CheckEntry::warn(
            check,
            format!("All items are {mode} min; may be legitimate but suspicious"),
        )
    } else if n >= 5 && mode_count + 1 >= n {
        CheckEntry::warn(
            check,
            format!("{mode_count} of {n} items share read time {mode} min"),
        )
    } else {
        CheckEntry::pass(
            check,
            format!("{} distinct values across {n} items", counts.len()),
        )
    }
}

fn check_summaries(selection: &Selection) -> CheckEntry {
    let check = GateCheck::SummaryContent;
    let empty = selection
        .items
        .iter()
        .filter(|i| i.summary.trim().is_empty())
        .count();
    if empty > 0 {
        return CheckEntry::fail(check, format!("{empty} items have empty summaries"));
    }

    let mut seen: HashMap<&str, usize> = HashMap::new();
    for entry in &selection.items {
        *seen.entry(entry.summary.trim()).or_default() += 1;
    }
    let duplicates = seen.values().filter(|c| **c > 1).count();
    if duplicates > 0 {
        CheckEntry::warn(check, format!("{duplicates} duplicate summaries found"))
    } else {
        CheckEntry::pass(
            check,
            format!("All {} summaries unique and non-empty", selection.len()),
        )
    }
}

fn check_placeholders(body: &str) -> CheckEntry {
    let check = GateCheck::TemplateRendering;
    let found: Vec<&str> = placeholder_re().find_iter(body).map(|m| m.as_str()).collect();
    if found.is_empty() {
        CheckEntry::pass(check, "No unrendered placeholders")
    } else {
        let sample: Vec<&str> = found.iter().take(3).copied().collect();
        CheckEntry::fail(
            check,
            format!("{} unrendered placeholders: {}", found.len(), sample.join(" ")),
        )
    }
}

fn check_stale_values(body: &str) -> CheckEntry {
    let check = GateCheck::DynamicValues;
    match stale_value_res().iter().find(|(re, _)| re.is_match(body)) {
        Some((_, description)) => CheckEntry::warn(check, *description),
        None => CheckEntry::pass(check, "No hardcoded counts detected"),
    }
}

fn check_size(artifact: &RenderedArtifact) -> CheckEntry {
    let check = GateCheck::ArtifactSize;
    let bytes = artifact.byte_size;
    let kib = artifact.size_kib();
    if bytes > CLIP_THRESHOLD_BYTES {
        CheckEntry::warn(
            check,
            format!("{kib:.1} KiB exceeds the 102 KiB clipping threshold"),
        )
    } else if bytes < MIN_ARTIFACT_BYTES {
        CheckEntry::fail(check, format!("Suspiciously small: {bytes} bytes"))
    } else {
        CheckEntry::pass(check, format!("{kib:.1} KiB"))
    }
}

/// Whether an `href` value is an acceptable outbound reference.
pub fn href_is_valid(href: &str) -> bool {
    let href = href.trim();
    if href.starts_with('#') || href.starts_with("mailto:") || href.starts_with("tel:") {
        return true;
    }
    if href.starts_with('/') {
        // Root-relative or protocol-relative; the latter needs a host.
        return match href.strip_prefix("//") {
            Some(rest) => !rest.is_empty() && !rest.starts_with('/'),
            None => true,
        };
    }
    match Url::parse(href) {
        Ok(url) => url.host_str().is_some_and(|h| !h.is_empty()),
        Err(_) => false,
    }
}

fn check_hrefs(body: &str) -> CheckEntry {
    let check = GateCheck::HrefValidity;
    let hrefs: Vec<&str> = href_re()
        .captures_iter(body)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .collect();
    // Unrendered placeholders are reported by the template check.
    let invalid: Vec<&str> = hrefs
        .iter()
        .copied()
        .filter(|h| !h.starts_with('{') && !href_is_valid(h))
        .collect();
    if invalid.is_empty() {
        CheckEntry::pass(check, format!("All {} href attributes valid", hrefs.len()))
    } else {
        let first: String = invalid[0].chars().take(60).collect();
        CheckEntry::warn(
            check,
            format!("{} suspicious href(s): {first}", invalid.len()),
        )
    }
}
