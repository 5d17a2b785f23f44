//! Plain-text output for the query commands.

use sprout_core::{
  store::{RecentPrint, Statistics},
  tag::Tag,
};

fn mark(tag: &Tag) -> char { if tag.is_confirmed() { '*' } else { ' ' } }

pub fn tag_table(tags: &[Tag], fields: &[String]) {
  if tags.is_empty() {
    println!("no tags");
    return;
  }
  for tag in tags {
    println!(
      "{:>6} {} {:<40} {:<12} {:>4} printed",
      tag.tag_id.to_string(),
      mark(tag),
      tag.content.formdata.display_line(fields),
      tag.content.template.name,
      tag.total_prints()
    );
  }
}

pub fn tag_detail(tag: &Tag) {
  println!("tag        {}", tag.tag_id);
  println!("confirmed  {}", tag.is_confirmed());
  println!("template   {}", tag.content.template.name);
  println!("offset     {}", tag.content.offset);
  for (field, value) in tag.content.formdata.iter() {
    println!("  {field:<12} {value}");
  }
  match (&tag.image_path, tag.image_source) {
    (Some(path), Some(source)) => println!("image      {path} (from {source})"),
    (Some(path), None) => println!("image      {path}"),
    _ => println!("image      none"),
  }
  println!("origin     {}", tag.origin);
  println!("created    {}", tag.created_at.format("%Y-%m-%d %H:%M:%S"));
  println!("prints     {}", tag.total_prints());
  for event in tag.print_history() {
    println!(
      "  {}  x{}",
      event.occurred_at.format("%Y-%m-%d %H:%M:%S"),
      event.copies
    );
  }
}

pub fn statistics(stats: &Statistics, fields: &[String]) {
  println!("tags       {}", stats.total_tags);
  println!("confirmed  {}", stats.confirmed_tags);
  println!("prints     {}", stats.total_prints);
  if let Some(top) = &stats.most_printed {
    println!(
      "most       {} {} ({} copies)",
      top.tag.tag_id,
      top.tag.content.formdata.display_line(fields),
      top.copies
    );
  }
}

pub fn recent(prints: &[RecentPrint], fields: &[String]) {
  if prints.is_empty() {
    println!("no multi-copy prints");
    return;
  }
  for r in prints {
    println!(
      "{:>6} {:<40} {:>4} copies",
      r.tag.tag_id.to_string(),
      r.tag.content.formdata.display_line(fields),
      r.copies
    );
  }
}
