//! Content-addressed identities for plant tags.
//!
//! Two digests are derived from a tag's content. The *content* identity covers
//! what the label says (formdata and template name) and answers "is this the
//! same logical tag". The *exact* identity additionally folds in the offset
//! adjustment and answers "would this render pixel-identically".
//!
//! Both are SHA-256 over a canonical JSON document whose object keys are
//! emitted in sorted order, so the digest is independent of map iteration
//! order, process, and platform.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};

use crate::{
  Error, Result,
  tag::{Formdata, Offset},
};

// ─── Digest ──────────────────────────────────────────────────────────────────

/// A 32-byte SHA-256 digest, rendered as lowercase hex.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Digest([u8; 32]);

impl Digest {
  pub fn of(bytes: &[u8]) -> Self { Self(Sha256::digest(bytes).into()) }

  pub fn to_hex(&self) -> String { hex::encode(self.0) }

  pub fn from_hex(s: &str) -> Result<Self> {
    let bytes =
      hex::decode(s).map_err(|_| Error::InvalidDigest(s.to_owned()))?;
    let bytes: [u8; 32] = bytes
      .try_into()
      .map_err(|_| Error::InvalidDigest(s.to_owned()))?;
    Ok(Self(bytes))
  }

  /// First eight hex characters; enough to tell tags apart in a report.
  pub fn short(&self) -> String { self.to_hex()[..8].to_owned() }
}

impl fmt::Debug for Digest {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "Digest({})", self.short())
  }
}

impl fmt::Display for Digest {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.to_hex())
  }
}

// ─── Identity newtypes ───────────────────────────────────────────────────────

/// Logical identity: `hash(formdata, template_name)`.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(into = "String", try_from = "String")]
pub struct ContentIdentity(Digest);

/// Rendering identity: `hash(formdata, template_name, offset_adjustment)`.
/// The store enforces uniqueness on this key.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(into = "String", try_from = "String")]
pub struct ExactIdentity(Digest);

impl ContentIdentity {
  pub fn digest(&self) -> Digest { self.0 }

  pub fn to_hex(&self) -> String { self.0.to_hex() }

  pub fn short(&self) -> String { self.0.short() }
}

impl ExactIdentity {
  pub fn digest(&self) -> Digest { self.0 }

  pub fn to_hex(&self) -> String { self.0.to_hex() }

  pub fn short(&self) -> String { self.0.short() }
}

impl fmt::Display for ContentIdentity {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    fmt::Display::fmt(&self.0, f)
  }
}

impl fmt::Display for ExactIdentity {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    fmt::Display::fmt(&self.0, f)
  }
}

impl FromStr for ContentIdentity {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> { Ok(Self(Digest::from_hex(s)?)) }
}

impl FromStr for ExactIdentity {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> { Ok(Self(Digest::from_hex(s)?)) }
}

impl From<ContentIdentity> for String {
  fn from(id: ContentIdentity) -> Self { id.to_hex() }
}

impl From<ExactIdentity> for String {
  fn from(id: ExactIdentity) -> Self { id.to_hex() }
}

impl TryFrom<String> for ContentIdentity {
  type Error = Error;

  fn try_from(s: String) -> Result<Self> { s.parse() }
}

impl TryFrom<String> for ExactIdentity {
  type Error = Error;

  fn try_from(s: String) -> Result<Self> { s.parse() }
}

// ─── Derivation ──────────────────────────────────────────────────────────────

/// Compute the logical identity of a tag.
pub fn content_identity(
  formdata: &Formdata,
  template_name: &str,
) -> ContentIdentity {
  ContentIdentity(Digest::of(
    canonical_document(formdata, template_name, None).as_bytes(),
  ))
}

/// Compute the rendering identity of a tag.
pub fn exact_identity(
  formdata: &Formdata,
  template_name: &str,
  offset: Offset,
) -> ExactIdentity {
  ExactIdentity(Digest::of(
    canonical_document(formdata, template_name, Some(offset)).as_bytes(),
  ))
}

/// Build the canonical JSON text that is hashed.
///
/// `{"formdata":{<sorted keys>},"template":"<name>"[,"offset":[dx,dy]]}`
///
/// Keys are emitted in sorted order whatever `serde_json` features are on.
fn canonical_document(
  formdata: &Formdata,
  template_name: &str,
  offset: Option<Offset>,
) -> String {
  let mut out = String::from("{\"formdata\":{");
  for (i, (key, value)) in formdata.iter().enumerate() {
    if i > 0 {
      out.push(',');
    }
    out.push_str(&json_string(key));
    out.push(':');
    out.push_str(&json_string(value));
  }
  out.push_str("},\"template\":");
  out.push_str(&json_string(template_name));
  if let Some(offset) = offset {
    out.push_str(&format!(",\"offset\":[{},{}]", offset.dx, offset.dy));
  }
  out.push('}');
  out
}

fn json_string(s: &str) -> String {
  serde_json::Value::String(s.to_owned()).to_string()
}

#[cfg(test)]
mod tests {
  use super::*;

  fn formdata(pairs: &[(&str, &str)]) -> Formdata {
    pairs
      .iter()
      .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
      .collect()
  }

  #[test]
  fn content_identity_ignores_key_insertion_order() {
    let a = formdata(&[
      ("main_text", "Tomato"),
      ("midtext", "Cherokee Purple"),
      ("subtext", ""),
    ]);
    let b = formdata(&[
      ("subtext", ""),
      ("main_text", "Tomato"),
      ("midtext", "Cherokee Purple"),
    ]);
    assert_eq!(content_identity(&a, "default"), content_identity(&b, "default"));
  }

  #[test]
  fn content_identity_changes_with_any_value() {
    let base = formdata(&[("main_text", "Tomato"), ("midtext", "Sungold")]);
    let changed_value =
      formdata(&[("main_text", "Tomato"), ("midtext", "Sun Gold")]);
    let extra_field = formdata(&[
      ("main_text", "Tomato"),
      ("midtext", "Sungold"),
      ("subtext", ""),
    ]);

    let id = content_identity(&base, "default");
    assert_ne!(id, content_identity(&changed_value, "default"));
    assert_ne!(id, content_identity(&extra_field, "default"));
    assert_ne!(id, content_identity(&base, "herbs"));
  }

  #[test]
  fn exact_identity_varies_only_with_offset() {
    let fd = formdata(&[("main_text", "Basil"), ("midtext", "Genovese")]);
    let zero = exact_identity(&fd, "default", Offset::ZERO);
    let nudged = exact_identity(&fd, "default", Offset::new(5, -2));

    assert_ne!(zero, nudged);
    assert_eq!(nudged, exact_identity(&fd, "default", Offset::new(5, -2)));
    assert_ne!(
      exact_identity(&fd, "default", Offset::new(-2, 5)),
      nudged,
      "offset components are ordered"
    );
  }

  #[test]
  fn content_and_exact_documents_differ() {
    let fd = formdata(&[("main_text", "Basil")]);
    assert_ne!(
      content_identity(&fd, "default").digest(),
      exact_identity(&fd, "default", Offset::ZERO).digest()
    );
  }

  #[test]
  fn canonical_document_escapes_strings() {
    let fd = formdata(&[("main_text", "Pepper \"Hot\"\n")]);
    let doc = canonical_document(&fd, "default", Some(Offset::new(1, 2)));
    assert_eq!(
      doc,
      r#"{"formdata":{"main_text":"Pepper \"Hot\"\n"},"template":"default","offset":[1,2]}"#
    );
  }

  #[test]
  fn hex_roundtrip() {
    let fd = formdata(&[("main_text", "Kale")]);
    let id = content_identity(&fd, "default");
    let hex = id.to_hex();
    assert_eq!(hex.len(), 64);
    assert_eq!(hex.parse::<ContentIdentity>().unwrap(), id);
    assert!("not-hex".parse::<ContentIdentity>().is_err());
    assert!("abcd".parse::<ExactIdentity>().is_err());
  }
}
