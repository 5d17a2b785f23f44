//! Minimal RFC 4180 reader: comma separated, `"` quoting, `""` escapes,
//! quoted fields may span lines. Blank lines are skipped.

/// Split `input` into rows of fields.
pub(crate) fn parse_rows(input: &str) -> Vec<Vec<String>> {
  let input = input.strip_prefix('\u{feff}').unwrap_or(input);
  let mut rows = Vec::new();
  let mut row = Vec::new();
  let mut field = String::new();
  let mut in_quotes = false;
  let mut chars = input.chars().peekable();

  while let Some(c) = chars.next() {
    if in_quotes {
      match c {
        '"' if chars.peek() == Some(&'"') => {
          chars.next();
          field.push('"');
        }
        '"' => in_quotes = false,
        _ => field.push(c),
      }
      continue;
    }
    match c {
      '"' => in_quotes = true,
      ',' => row.push(std::mem::take(&mut field)),
      '\r' if chars.peek() == Some(&'\n') => {}
      '\n' | '\r' => {
        row.push(std::mem::take(&mut field));
        push_row(&mut rows, std::mem::take(&mut row));
      }
      _ => field.push(c),
    }
  }
  if !field.is_empty() || !row.is_empty() {
    row.push(field);
    push_row(&mut rows, row);
  }
  rows
}

fn push_row(rows: &mut Vec<Vec<String>>, row: Vec<String>) {
  if !(row.len() == 1 && row[0].is_empty()) {
    rows.push(row);
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn plain_rows() {
    assert_eq!(parse_rows("a,b\n1,2\n"), vec![vec!["a", "b"], vec!["1", "2"]]);
    assert_eq!(parse_rows("a,b\r\n1,\r\n"), vec![vec!["a", "b"], vec!["1", ""]]);
  }

  #[test]
  fn quoting_commas_newlines_and_escaped_quotes() {
    let rows = parse_rows("name,note\n\"Pepper, hot\",\"says \"\"wow\"\"\nok\"\n");
    assert_eq!(rows, vec![vec!["name", "note"], vec![
      "Pepper, hot",
      "says \"wow\"\nok"
    ]]);
  }

  #[test]
  fn blank_lines_bom_and_missing_final_newline() {
    let rows = parse_rows("\u{feff}a\n\nx\n\ny");
    assert_eq!(rows, vec![vec!["a"], vec!["x"], vec!["y"]]);
    assert!(parse_rows("").is_empty());
  }
}
