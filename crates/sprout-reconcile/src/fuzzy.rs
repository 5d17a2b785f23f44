//! Best-effort matching of a hand-written master list against stored tags.
//!
//! Each list line reads `<name> - <count>`: a plant and how many labels it
//! needs. Names are matched against confirmed tags by a partial token-set
//! similarity; entries that score below the threshold are reported as
//! unmatched, never guessed.

use std::{collections::BTreeSet, fmt, path::Path, sync::LazyLock};

use regex::Regex;
use serde::Serialize;
use sprout_core::{
  store::{TagQuery, TagStore},
  tag::{Tag, TagId},
};
use tracing::{debug, info};

use crate::{Error, Result, config::ReconcileConfig};

static LINE: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"^\s*(?P<name>.+?)\s*-\s*(?P<count>\d+)").expect("valid regex")
});

// ─── Master list ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MasterEntry {
  /// One-based line number.
  pub line:      usize,
  pub name:      String,
  pub requested: u64,
}

/// Parse a master list. Returns the entries and the number of non-blank
/// lines that did not match the grammar.
pub fn parse_master_list(text: &str) -> (Vec<MasterEntry>, usize) {
  let mut entries = Vec::new();
  let mut skipped = 0;
  for (i, line) in text.lines().enumerate() {
    if line.trim().is_empty() {
      continue;
    }
    let parsed = LINE.captures(line).and_then(|caps| {
      Some(MasterEntry {
        line:      i + 1,
        name:      caps["name"].trim().to_owned(),
        requested: caps["count"].parse().ok()?,
      })
    });
    match parsed {
      Some(entry) => entries.push(entry),
      None => skipped += 1,
    }
  }
  (entries, skipped)
}

// ─── Scoring ─────────────────────────────────────────────────────────────────

/// Lowercase, drop everything but alphanumerics, `_` and whitespace, and
/// collapse runs of whitespace.
pub fn canonicalize(s: &str) -> String {
  s.to_lowercase()
    .chars()
    .filter(|c| c.is_alphanumeric() || *c == '_' || c.is_whitespace())
    .collect::<String>()
    .split_whitespace()
    .collect::<Vec<_>>()
    .join(" ")
}

fn ratio(a: &str, b: &str) -> f64 { strsim::normalized_levenshtein(a, b) }

fn percent(similarity: f64) -> u8 { (similarity * 100.0).round() as u8 }

/// Best similarity of the shorter string against every same-length window
/// of the longer one.
fn partial_ratio(a: &str, b: &str) -> f64 {
  let (short, long) = if a.chars().count() <= b.chars().count() {
    (a, b)
  } else {
    (b, a)
  };
  let short_len = short.chars().count();
  if short_len == 0 {
    return 0.0;
  }
  let long: Vec<char> = long.chars().collect();
  (0..=long.len() - short_len)
    .map(|start| {
      let window: String = long[start..start + short_len].iter().collect();
      ratio(short, &window)
    })
    .fold(0.0, f64::max)
}

struct TokenSets<'a> {
  common: Vec<&'a str>,
  only_a: Vec<&'a str>,
  only_b: Vec<&'a str>,
}

impl<'a> TokenSets<'a> {
  fn new(a: &'a str, b: &'a str) -> Self {
    let a: BTreeSet<&str> = a.split_whitespace().collect();
    let b: BTreeSet<&str> = b.split_whitespace().collect();
    Self {
      common: a.intersection(&b).copied().collect(),
      only_a: a.difference(&b).copied().collect(),
      only_b: b.difference(&a).copied().collect(),
    }
  }
}

/// 100 when the two share any token; otherwise the partial ratio of their
/// sorted tokens.
pub fn partial_token_set_ratio(a: &str, b: &str) -> u8 {
  let sets = TokenSets::new(a, b);
  if !sets.common.is_empty() {
    return 100;
  }
  percent(partial_ratio(&sets.only_a.join(" "), &sets.only_b.join(" ")))
}

/// Similarity of the two token sets written out in full: shared tokens
/// first, then each side's own. Used to break ties between candidates that
/// share tokens with the name.
pub fn token_set_ratio(a: &str, b: &str) -> u8 {
  let sets = TokenSets::new(a, b);
  if sets.only_a.is_empty() && sets.only_b.is_empty() {
    return if sets.common.is_empty() { 0 } else { 100 };
  }
  let join = |rest: &[&str]| {
    sets.common.iter().chain(rest).copied().collect::<Vec<_>>().join(" ")
  };
  percent(ratio(&join(&sets.only_a), &join(&sets.only_b)))
}

// ─── Matching ────────────────────────────────────────────────────────────────

/// A stored tag as the matcher sees it.
#[derive(Debug, Clone)]
pub struct Candidate {
  pub tag_id:    TagId,
  pub label:     String,
  pub canonical: String,
  pub printed:   u64,
}

impl Candidate {
  pub fn from_tag(tag: &Tag, fields: &[String]) -> Self {
    let label = tag.content.formdata.display_line(fields);
    Self {
      tag_id: tag.tag_id,
      canonical: canonicalize(&label),
      label,
      printed: tag.total_prints(),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FuzzyMatch {
  pub entry:     MasterEntry,
  pub tag_id:    TagId,
  pub label:     String,
  pub score:     u8,
  pub printed:   u64,
  /// `requested - printed`, floored at zero.
  pub remaining: u64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MatchReport {
  pub threshold:     u8,
  pub matched:       Vec<FuzzyMatch>,
  pub unmatched:     Vec<MasterEntry>,
  pub skipped_lines: usize,
}

impl fmt::Display for MatchReport {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for m in &self.matched {
      writeln!(
        f,
        "match     {:<28} -> {} {} (score {}, printed {}, remaining {})",
        m.entry.name, m.tag_id, m.label, m.score, m.printed, m.remaining
      )?;
    }
    for e in &self.unmatched {
      writeln!(f, "no match  {:<28}    needs {}", e.name, e.requested)?;
    }
    writeln!(
      f,
      "{} matched, {} unmatched, {} line(s) skipped, threshold {}",
      self.matched.len(),
      self.unmatched.len(),
      self.skipped_lines,
      self.threshold
    )
  }
}

/// Match every entry against `candidates`, keeping the best at or above
/// `threshold`.
pub fn match_entries(
  entries: Vec<MasterEntry>,
  candidates: &[Candidate],
  threshold: u8,
) -> MatchReport {
  let mut report = MatchReport { threshold, ..MatchReport::default() };
  for entry in entries {
    let name = canonicalize(&entry.name);
    let best = candidates
      .iter()
      .map(|c| {
        let key = (
          partial_token_set_ratio(&name, &c.canonical),
          token_set_ratio(&name, &c.canonical),
          c.printed,
        );
        (key, c)
      })
      // First candidate wins among equal keys.
      .fold(None, |best: Option<((u8, u8, u64), &Candidate)>, next| match best {
        Some(b) if b.0 >= next.0 => Some(b),
        _ => Some(next),
      });

    match best {
      Some(((score, ..), c)) if score >= threshold => {
        debug!(entry = %entry.name, tag = %c.tag_id, score, "matched");
        report.matched.push(FuzzyMatch {
          remaining: entry.requested.saturating_sub(c.printed),
          tag_id: c.tag_id,
          label: c.label.clone(),
          score,
          printed: c.printed,
          entry,
        });
      }
      _ => {
        debug!(entry = %entry.name, "no match");
        report.unmatched.push(entry);
      }
    }
  }
  report
}

/// Read the master list at `path` and match it against the store's confirmed
/// tags.
pub async fn match_master_list<S: TagStore>(
  store: &S,
  config: &ReconcileConfig,
  path: &Path,
) -> Result<MatchReport> {
  let text = std::fs::read_to_string(path)
    .map_err(|source| Error::MasterList { path: path.to_owned(), source })?;
  let (entries, skipped) = parse_master_list(&text);

  let query = TagQuery { confirmed_only: true, ..TagQuery::default() };
  let candidates: Vec<Candidate> = store
    .list(&query)
    .await
    .map_err(Error::store)?
    .iter()
    .map(|t| Candidate::from_tag(t, &config.label_fields))
    .collect();

  let mut report =
    match_entries(entries, &candidates, config.fuzzy_threshold);
  report.skipped_lines = skipped;
  info!(
    matched = report.matched.len(),
    unmatched = report.unmatched.len(),
    skipped,
    "master list matched"
  );
  Ok(report)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn candidate(id: i64, label: &str, printed: u64) -> Candidate {
    Candidate {
      tag_id: TagId(id),
      label: label.into(),
      canonical: canonicalize(label),
      printed,
    }
  }

  #[test]
  fn parses_name_count_lines() {
    let (entries, skipped) = parse_master_list(
      "Cherokee-Purple - 3\n\n  Sweet Basil -12\nno count here\nKale - x\n",
    );
    assert_eq!(entries, vec![
      MasterEntry { line: 1, name: "Cherokee-Purple".into(), requested: 3 },
      MasterEntry { line: 3, name: "Sweet Basil".into(), requested: 12 },
    ]);
    assert_eq!(skipped, 2);
  }

  #[test]
  fn canonical_form() {
    assert_eq!(canonicalize("  Sweet 100's,  (F1) "), "sweet 100s f1");
    assert_eq!(canonicalize("Jalapeño"), "jalapeño");
    assert_eq!(canonicalize("a_b"), "a_b");
  }

  #[test]
  fn shared_token_scores_full() {
    assert_eq!(partial_token_set_ratio("cherokee", "tomato cherokee purple"), 100);
    assert_eq!(partial_token_set_ratio("", "tomato"), 0);
  }

  #[test]
  fn near_misses_score_by_alignment() {
    // "cherokea" against "cherokee": one substitution in eight characters.
    assert_eq!(partial_token_set_ratio("cherokea", "tomato cherokee"), 88);
    assert!(partial_token_set_ratio("zucchini", "tomato cherokee") < 70);
  }

  #[test]
  fn token_set_ratio_breaks_ties() {
    assert_eq!(token_set_ratio("tomato", "tomato"), 100);
    assert!(
      token_set_ratio("cherokee purple", "tomato cherokee purple")
        > token_set_ratio("cherokee purple", "tomato cherokee purple heirloom large")
    );
  }

  #[test]
  fn shared_first_word_ties_break_on_the_rest() {
    let candidates = [
      candidate(1, "Tomato Cherokee Purple", 50),
      candidate(2, "Tomato Sungold", 1),
    ];
    let (entries, _) = parse_master_list("Tomato Sungold - 3
");
    let report = match_entries(entries, &candidates, 70);
    assert_eq!(report.matched[0].tag_id, TagId(2));
  }

  #[test]
  fn matches_report_remaining_and_unmatched() {
    let candidates = [
      candidate(1, "Tomato Cherokee Purple heirloom large", 10),
      candidate(2, "Tomato Cherokee Purple", 2),
      candidate(3, "Pepper Jalapeño", 5),
    ];
    let (entries, _) =
      parse_master_list("Cherokee Purple - 6\nJalapeno - 2\nOkra - 4\n");
    let report = match_entries(entries, &candidates, 70);

    assert_eq!(report.matched.len(), 2);
    let cherokee = &report.matched[0];
    assert_eq!(cherokee.tag_id, TagId(2), "tighter token set wins the tie");
    assert_eq!(cherokee.remaining, 4);

    let jalapeno = &report.matched[1];
    assert_eq!(jalapeno.tag_id, TagId(3));
    assert_eq!(jalapeno.remaining, 0, "floored at zero");

    assert_eq!(report.unmatched.len(), 1);
    assert_eq!(report.unmatched[0].name, "Okra");
  }
}
