use std::io::{self, IsTerminal, Write};

use anyhow::anyhow;
use chrono::NaiveDateTime;
use chrono::format::{Item as FormatItem, StrftimeItems};
use unicode_width::UnicodeWidthStr;

use crate::config::Config;
use crate::datetime::DEFAULT_DISPLAY_FORMAT;
use crate::item::{Item, Priority, Recurrence};
use crate::recurrence::RecurrenceRule;

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
    date_format: String,
}

impl Renderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let color_cfg = cfg.get("color").unwrap_or_else(|| "on".to_string());
        let color = match color_cfg.to_ascii_lowercase().as_str() {
            "on" | "yes" | "true" | "1" => true,
            "off" | "no" | "false" | "0" => false,
            other => return Err(anyhow!("invalid color setting: {other}")),
        };
        let date_format = cfg
            .get("date.format")
            .unwrap_or_else(|| DEFAULT_DISPLAY_FORMAT.to_string());
        if StrftimeItems::new(&date_format).any(|item| matches!(item, FormatItem::Error)) {
            return Err(anyhow!("invalid date.format setting: {date_format}"));
        }

        Ok(Self { color, date_format })
    }

    pub fn format_date(&self, dt: NaiveDateTime) -> String {
        dt.format(&self.date_format).to_string()
    }

    #[tracing::instrument(skip(self, items, now))]
    pub fn print_item_table(&mut self, items: &[Item], now: NaiveDateTime) -> anyhow::Result<()> {
        let out = io::stdout().lock();

        let headers = vec![
            "ID".to_string(),
            "Kind".to_string(),
            "When".to_string(),
            "Name".to_string(),
            "Priority".to_string(),
            "Categories".to_string(),
            "Series".to_string(),
        ];

        let mut rows = Vec::with_capacity(items.len());

        for item in items {
            let id = self.paint(&item.id.to_string(), "33");

            let when = item.when.map(|w| self.format_date(w)).unwrap_or_default();
            let when = if item.is_overdue(now) {
                self.paint(&when, "31")
            } else {
                when
            };

            let name = if item.is_task() && item.complete {
                self.paint(&format!("[x] {}", item.name), "2")
            } else if item.is_task() {
                format!("[ ] {}", item.name)
            } else {
                item.name.clone()
            };

            let priority = item
                .priority
                .map(|priority| self.paint_priority(priority))
                .unwrap_or_default();

            let categories = item
                .categories
                .iter()
                .map(|category| format!("+{category}"))
                .collect::<Vec<_>>()
                .join(" ");

            let series = item
                .recurrence_id
                .map(|group| short_group(&group.to_string()))
                .unwrap_or_default();

            rows.push(vec![
                id,
                item.kind.to_string(),
                when,
                name,
                priority,
                categories,
                series,
            ]);
        }

        write_table(out, headers, rows)?;
        Ok(())
    }

    #[tracing::instrument(skip(self, item, recurrence))]
    pub fn print_item_info(
        &mut self,
        item: &Item,
        rule: RecurrenceRule,
        recurrence: Option<&Recurrence>,
    ) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        writeln!(out, "id          {}", item.id)?;
        writeln!(out, "uuid        {}", item.uuid)?;
        writeln!(out, "kind        {}", item.kind)?;
        writeln!(out, "name        {}", item.name)?;
        if let Some(when) = item.when {
            let label = if item.is_task() { "due" } else { "starts" };
            writeln!(out, "{label:<11} {}", self.format_date(when))?;
        }
        if item.is_task() {
            writeln!(out, "complete    {}", if item.complete { "yes" } else { "no" })?;
            writeln!(
                out,
                "priority    {}",
                item.priority.map(|p| p.as_str()).unwrap_or_default()
            )?;
        } else {
            writeln!(out, "place       {}", item.place.clone().unwrap_or_default())?;
        }
        writeln!(out, "notes       {}", item.notes.clone().unwrap_or_default())?;
        writeln!(
            out,
            "categories  {}",
            item.categories.iter().cloned().collect::<Vec<_>>().join(", ")
        )?;
        writeln!(out, "repeat      {rule}")?;
        if let Some(recurrence) = recurrence {
            writeln!(out, "series      {}", recurrence.id)?;
        }
        writeln!(out, "created     {}", item.created.to_rfc3339())?;
        writeln!(out, "updated     {}", item.last_updated.to_rfc3339())?;

        Ok(())
    }

    #[tracing::instrument(skip(self, occurrences))]
    pub fn print_series(&mut self, rule: RecurrenceRule, occurrences: &[NaiveDateTime]) -> anyhow::Result<()> {
        let out = io::stdout().lock();
        let headers = vec!["#".to_string(), "Date".to_string(), "Weekday".to_string()];
        let rows = occurrences
            .iter()
            .enumerate()
            .map(|(idx, when)| {
                vec![
                    (idx + 1).to_string(),
                    self.format_date(*when),
                    when.format("%A").to_string(),
                ]
            })
            .collect();

        println!("{rule}");
        write_table(out, headers, rows)?;
        Ok(())
    }

    fn paint_priority(&self, priority: Priority) -> String {
        let (r, g, b) = priority.color();
        self.paint(priority.as_str(), &format!("38;2;{r};{g};{b}"))
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color || !io::stdout().is_terminal() {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn short_group(group: &str) -> String {
    group.chars().take(8).collect()
}

pub fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for idx in 0..column_count {
        write!(writer, "{:width$} ", headers[idx], width = widths[idx])?;
    }
    writeln!(writer)?;

    for idx in 0..column_count {
        write!(writer, "{:-<width$} ", "", width = widths[idx])?;
    }
    writeln!(writer)?;

    for row in rows {
        for idx in 0..column_count {
            let cell = &row[idx];
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = widths[idx].saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::{strip_ansi, write_table};

    #[test]
    fn columns_align_on_visible_width() {
        let mut buf = Vec::new();
        write_table(
            &mut buf,
            vec!["ID".to_string(), "Name".to_string()],
            vec![
                vec!["\x1b[33m1\x1b[0m".to_string(), "Café".to_string()],
                vec!["12".to_string(), "Tea".to_string()],
            ],
        )
        .expect("write table");

        let text = String::from_utf8(buf).expect("utf8");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "ID Name ");
        assert_eq!(lines[1], "-- ---- ");
        assert_eq!(strip_ansi(lines[2]), "1  Café ");
        assert_eq!(lines[3], "12 Tea  ");
    }
}
