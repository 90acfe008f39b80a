use chrono::{
  Days,
  NaiveDate,
  NaiveDateTime
};
use tracing::trace;

use crate::datetime::parse_day_expr;
use crate::item::{
  Item,
  ItemKind
};

#[derive(Debug, Clone)]
pub enum Pred {
  Id(u64),
  Uuid(uuid::Uuid),
  CategoryInclude(String),
  CategoryExclude(String),
  VirtualTagInclude(VirtualTag),
  VirtualTagExclude(VirtualTag),
  KindEq(ItemKind),
  Complete(bool),
  OnDay(NaiveDate),
  FromDay(NaiveDate),
  ToDay(NaiveDate),
  SeriesPrefix(String),
  TextContains(String)
}

#[derive(Debug, Clone, Copy)]
pub enum VirtualTag {
  Today(NaiveDate),
  Tomorrow(NaiveDate),
  Overdue(NaiveDateTime),
  Recurring,
  Undated
}

#[derive(Debug, Clone)]
enum Expr {
  True,
  Pred(Pred),
  And(Vec<Expr>),
  Or(Vec<Expr>)
}

#[derive(Debug, Clone)]
pub struct Filter {
  expr: Expr
}

impl Default for Filter {
  fn default() -> Self {
    Self {
      expr: Expr::True
    }
  }
}

impl Filter {
  /// Relative terms (`on:today`,
  /// `+OVERDUE`) are resolved against
  /// `now` here, so matching needs no
  /// clock.
  #[tracing::instrument(skip(
    terms, now
  ))]
  pub fn parse(
    terms: &[String],
    now: NaiveDateTime
  ) -> anyhow::Result<Self> {
    if terms.is_empty() {
      return Ok(Self::default());
    }

    let tokens = lex_terms(terms);
    let mut parser =
      Parser::new(tokens, now);
    let expr = parser.parse_expr()?;
    parser.ensure_end()?;

    Ok(Self {
      expr
    })
  }

  pub fn matches(
    &self,
    item: &Item
  ) -> bool {
    eval_expr(&self.expr, item)
  }
}

struct Parser {
  tokens: Vec<String>,
  pos:    usize,
  now:    NaiveDateTime
}

impl Parser {
  fn new(
    tokens: Vec<String>,
    now: NaiveDateTime
  ) -> Self {
    Self {
      tokens,
      pos: 0,
      now
    }
  }

  fn parse_expr(
    &mut self
  ) -> anyhow::Result<Expr> {
    self.parse_or()
  }

  fn parse_or(
    &mut self
  ) -> anyhow::Result<Expr> {
    let mut nodes =
      vec![self.parse_and()?];

    while self.match_any(&["or", "||"])
    {
      nodes.push(self.parse_and()?);
    }

    if nodes.len() == 1 {
      Ok(nodes.remove(0))
    } else {
      Ok(Expr::Or(nodes))
    }
  }

  fn parse_and(
    &mut self
  ) -> anyhow::Result<Expr> {
    let mut nodes =
      vec![self.parse_primary()?];

    loop {
      if self.match_any(&["and", "&&"])
      {
        nodes
          .push(self.parse_primary()?);
        continue;
      }

      if self
        .peek_is_implicit_and_boundary()
      {
        nodes
          .push(self.parse_primary()?);
        continue;
      }

      break;
    }

    if nodes.len() == 1 {
      Ok(nodes.remove(0))
    } else {
      Ok(Expr::And(nodes))
    }
  }

  fn parse_primary(
    &mut self
  ) -> anyhow::Result<Expr> {
    if self.match_token("(") {
      let inner = self.parse_expr()?;
      self.expect_token(")")?;
      return Ok(inner);
    }

    let token = self
      .next_token()
      .ok_or_else(|| {
        anyhow::anyhow!(
          "unexpected end of filter \
           expression"
        )
      })?;

    if token == ")" {
      return Err(anyhow::anyhow!(
        "unexpected ')' in filter \
         expression"
      ));
    }

    let pred =
      parse_atom(&token, self.now)?;
    Ok(Expr::Pred(pred))
  }

  fn ensure_end(
    &self
  ) -> anyhow::Result<()> {
    if self.pos < self.tokens.len() {
      Err(anyhow::anyhow!(
        "unexpected token in filter \
         expression: {}",
        self.tokens[self.pos]
      ))
    } else {
      Ok(())
    }
  }

  fn match_token(
    &mut self,
    expected: &str
  ) -> bool {
    let Some(tok) =
      self.tokens.get(self.pos)
    else {
      return false;
    };
    if tok
      .eq_ignore_ascii_case(expected)
    {
      self.pos += 1;
      true
    } else {
      false
    }
  }

  fn match_any(
    &mut self,
    options: &[&str]
  ) -> bool {
    options
      .iter()
      .any(|opt| self.match_token(opt))
  }

  fn expect_token(
    &mut self,
    expected: &str
  ) -> anyhow::Result<()> {
    if self.match_token(expected) {
      Ok(())
    } else {
      Err(anyhow::anyhow!(
        "expected '{expected}' in \
         filter expression"
      ))
    }
  }

  fn next_token(
    &mut self
  ) -> Option<String> {
    let out = self
      .tokens
      .get(self.pos)
      .cloned();
    if out.is_some() {
      self.pos += 1;
    }
    out
  }

  fn peek_is_implicit_and_boundary(
    &self
  ) -> bool {
    let Some(tok) =
      self.tokens.get(self.pos)
    else {
      return false;
    };

    if tok.eq_ignore_ascii_case("and")
      || tok.eq_ignore_ascii_case("&&")
    {
      return false;
    }

    !tok.eq_ignore_ascii_case("or")
      && !tok.eq_ignore_ascii_case("||")
      && !tok.eq_ignore_ascii_case(")")
  }
}

fn lex_terms(
  terms: &[String]
) -> Vec<String> {
  let mut out = Vec::new();

  for term in terms {
    let mut current = String::new();
    for ch in term.chars() {
      if ch == '(' || ch == ')' {
        if !current.is_empty() {
          out.push(current.clone());
          current.clear();
        }
        out.push(ch.to_string());
      } else {
        current.push(ch);
      }
    }

    if !current.is_empty() {
      out.push(current);
    }
  }

  out
}

fn parse_atom(
  term: &str,
  now: NaiveDateTime
) -> anyhow::Result<Pred> {
  if let Some(tag) =
    term.strip_prefix('+')
  {
    if let Some(virtual_tag) =
      parse_virtual_tag(tag, now)
    {
      return Ok(
        Pred::VirtualTagInclude(
          virtual_tag
        )
      );
    }
    return Ok(Pred::CategoryInclude(
      tag.to_string()
    ));
  }
  if let Some(tag) =
    term.strip_prefix('-')
  {
    if let Some(virtual_tag) =
      parse_virtual_tag(tag, now)
    {
      return Ok(
        Pred::VirtualTagExclude(
          virtual_tag
        )
      );
    }
    return Ok(Pred::CategoryExclude(
      tag.to_string()
    ));
  }
  if let Ok(id) = term.parse::<u64>() {
    return Ok(Pred::Id(id));
  }
  if let Ok(uuid) =
    uuid::Uuid::parse_str(term)
  {
    return Ok(Pred::Uuid(uuid));
  }

  if let Some(kind) =
    term.strip_prefix("kind:")
  {
    return Ok(Pred::KindEq(
      kind.parse::<ItemKind>()?
    ));
  }

  if let Some(status_text) =
    term.strip_prefix("status:")
  {
    return match status_text
      .to_ascii_lowercase()
      .as_str()
    {
      | "pending" => {
        Ok(Pred::Complete(false))
      }
      | "done" | "completed" => {
        Ok(Pred::Complete(true))
      }
      | other => {
        Err(anyhow::anyhow!(
          "unknown status filter: \
           {other} (expected pending \
           or done)"
        ))
      }
    };
  }

  if let Some(value) =
    term.strip_prefix("on:")
  {
    return Ok(Pred::OnDay(
      parse_day_expr(value, now)?
    ));
  }

  if let Some(value) =
    term.strip_prefix("from:")
  {
    return Ok(Pred::FromDay(
      parse_day_expr(value, now)?
    ));
  }

  if let Some(value) =
    term.strip_prefix("to:")
  {
    return Ok(Pred::ToDay(
      parse_day_expr(value, now)?
    ));
  }

  if let Some(prefix) =
    term.strip_prefix("series:")
  {
    return Ok(Pred::SeriesPrefix(
      prefix.to_ascii_lowercase()
    ));
  }

  Ok(Pred::TextContains(
    term.to_string()
  ))
}

fn eval_expr(
  expr: &Expr,
  item: &Item
) -> bool {
  match expr {
    | Expr::True => true,
    | Expr::Pred(pred) => {
      eval_pred(pred, item)
    }
    | Expr::And(nodes) => {
      nodes
        .iter()
        .all(|node| eval_expr(node, item))
    }
    | Expr::Or(nodes) => {
      nodes
        .iter()
        .any(|node| eval_expr(node, item))
    }
  }
}

fn eval_pred(
  pred: &Pred,
  item: &Item
) -> bool {
  let day = item.when.map(|w| w.date());
  let ok = match pred {
    | Pred::Id(id) => item.id == *id,
    | Pred::Uuid(uuid) => {
      item.uuid == *uuid
    }
    | Pred::CategoryInclude(name) => {
      item.categories.contains(name)
    }
    | Pred::CategoryExclude(name) => {
      !item.categories.contains(name)
    }
    | Pred::VirtualTagInclude(
      virtual_tag
    ) => {
      eval_virtual_tag(
        *virtual_tag,
        item
      )
    }
    | Pred::VirtualTagExclude(
      virtual_tag
    ) => {
      !eval_virtual_tag(
        *virtual_tag,
        item
      )
    }
    | Pred::KindEq(kind) => {
      item.kind == *kind
    }
    | Pred::Complete(complete) => {
      item.is_task()
        && item.complete == *complete
    }
    | Pred::OnDay(target) => {
      day == Some(*target)
    }
    | Pred::FromDay(start) => {
      day
        .map(|d| d >= *start)
        .unwrap_or(false)
    }
    | Pred::ToDay(end) => {
      day
        .map(|d| d <= *end)
        .unwrap_or(false)
    }
    | Pred::SeriesPrefix(prefix) => {
      item
        .recurrence_id
        .map(|group| {
          group
            .to_string()
            .starts_with(prefix.as_str())
        })
        .unwrap_or(false)
    }
    | Pred::TextContains(text) => {
      item
        .name
        .to_ascii_lowercase()
        .contains(
          &text.to_ascii_lowercase()
        )
    }
  };

  trace!(pred = ?pred, id = item.id, uuid = %item.uuid, ok, "filter predicate evaluation");
  ok
}

fn eval_virtual_tag(
  virtual_tag: VirtualTag,
  item: &Item
) -> bool {
  let day = item.when.map(|w| w.date());
  match virtual_tag {
    | VirtualTag::Today(today) => {
      day == Some(today)
    }
    | VirtualTag::Tomorrow(tomorrow) => {
      day == Some(tomorrow)
    }
    | VirtualTag::Overdue(now) => {
      item.is_overdue(now)
    }
    | VirtualTag::Recurring => {
      item.recurrence_id.is_some()
    }
    | VirtualTag::Undated => {
      item.when.is_none()
    }
  }
}

fn parse_virtual_tag(
  tag: &str,
  now: NaiveDateTime
) -> Option<VirtualTag> {
  let today = now.date();
  match tag {
    | "TODAY" => {
      Some(VirtualTag::Today(today))
    }
    | "TOMORROW" => {
      Some(VirtualTag::Tomorrow(
        today
          .checked_add_days(Days::new(1))
          .unwrap_or(today)
      ))
    }
    | "OVERDUE" => {
      Some(VirtualTag::Overdue(now))
    }
    | "RECURRING" => {
      Some(VirtualTag::Recurring)
    }
    | "UNDATED" => {
      Some(VirtualTag::Undated)
    }
    | _ => None
  }
}

#[cfg(test)]
mod tests {
  use chrono::{
    NaiveDate,
    NaiveDateTime,
    Utc
  };

  use super::Filter;
  use crate::item::{
    Item,
    ItemKind
  };

  fn now() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2026, 2, 16)
      .and_then(|d| {
        d.and_hms_opt(5, 0, 0)
      })
      .expect("valid now")
  }

  fn item(
    id: u64,
    name: &str,
    categories: &[&str]
  ) -> Item {
    let mut item = Item::new(
      ItemKind::Task,
      name.to_string(),
      Utc::now(),
      id
    );
    item.categories = categories
      .iter()
      .map(|c| c.to_string())
      .collect();
    item
  }

  fn terms(raw: &[&str]) -> Vec<String> {
    raw
      .iter()
      .map(|t| t.to_string())
      .collect()
  }

  #[test]
  fn boolean_precedence_and_parentheses()
  {
    let x = item(1, "x", &["x"]);
    let y = item(2, "y", &["y"]);
    let xy = item(3, "xy", &["x", "y"]);

    let filter = Filter::parse(
      &terms(&[
        "(", "+x", "or", "+y", ")",
        "and", "+y"
      ]),
      now()
    )
    .expect("parse filter");

    assert!(!filter.matches(&x));
    assert!(filter.matches(&y));
    assert!(filter.matches(&xy));
  }

  #[test]
  fn virtual_tags_follow_the_clock() {
    let mut overdue =
      item(1, "overdue", &[]);
    overdue.when = NaiveDate::from_ymd_opt(
      2026, 2, 15
    )
    .and_then(|d| d.and_hms_opt(9, 0, 0));

    let mut tomorrow =
      item(2, "tomorrow", &[]);
    tomorrow.when =
      NaiveDate::from_ymd_opt(
        2026, 2, 17
      )
      .and_then(|d| {
        d.and_hms_opt(9, 0, 0)
      });

    let overdue_filter = Filter::parse(
      &terms(&["+OVERDUE"]),
      now()
    )
    .expect("parse overdue");
    let tomorrow_filter = Filter::parse(
      &terms(&["+TOMORROW"]),
      now()
    )
    .expect("parse tomorrow");

    assert!(overdue_filter.matches(&overdue));
    assert!(
      !overdue_filter.matches(&tomorrow)
    );
    assert!(
      tomorrow_filter.matches(&tomorrow)
    );

    overdue.complete = true;
    assert!(
      !overdue_filter.matches(&overdue)
    );
  }

  #[test]
  fn id_selector_and_kind() {
    let task = item(2, "walk dog", &[]);
    let filter = Filter::parse(
      &terms(&["2", "kind:task"]),
      now()
    )
    .expect("parse filter");
    assert!(filter.matches(&task));
    assert!(
      !filter.matches(&item(3, "walk", &[]))
    );

    assert!(
      Filter::parse(
        &terms(&["kind:meeting"]),
        now()
      )
      .is_err()
    );
  }

  #[test]
  fn text_search_is_case_insensitive() {
    let task = item(1, "Walk Dog", &[]);
    let filter = Filter::parse(
      &terms(&["dog"]),
      now()
    )
    .expect("parse filter");
    assert!(filter.matches(&task));
  }

  #[test]
  fn exclusions_uuid_and_series_tags() {
    let mut linked =
      item(1, "standup", &["work"]);
    linked.recurrence_id =
      Some(uuid::Uuid::new_v4());
    let loose = item(2, "errand", &[]);

    let recurring = Filter::parse(
      &terms(&["+RECURRING", "-home"]),
      now()
    )
    .expect("parse recurring");
    assert!(recurring.matches(&linked));
    assert!(!recurring.matches(&loose));

    let undated = Filter::parse(
      &terms(&["+UNDATED", "-RECURRING"]),
      now()
    )
    .expect("parse undated");
    assert!(undated.matches(&loose));
    assert!(!undated.matches(&linked));

    let not_work = Filter::parse(
      &terms(&["-work"]),
      now()
    )
    .expect("parse exclusion");
    assert!(!not_work.matches(&linked));

    let by_uuid = Filter::parse(
      &[linked.uuid.to_string()],
      now()
    )
    .expect("parse uuid");
    assert!(by_uuid.matches(&linked));
    assert!(!by_uuid.matches(&loose));
  }
}
