//! Menu builder — turns a dataset schema into a bounded set of choice
//! labels, plus the fixed control rows every menu carries.

use regex::Regex;
use std::sync::OnceLock;

use crate::collab::dataset::{ColumnType, Schema};

/// Marker prefixed to already-selected items in accumulator flows.
pub const SELECTED_MARKER: &str = "✅ ";

/// Which columns a menu offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionMode {
    All,
    NumericOnly,
    /// Non-numeric columns, plus numeric columns with few distinct values
    /// (ordinal-coded categories).
    CategoricalOnly,
}

/// A built menu: item rows followed by a control row ending in the back
/// label.
#[derive(Debug, Clone, PartialEq)]
pub struct Menu {
    pub rows: Vec<Vec<String>>,
    pub back_label: String,
}

impl Menu {
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.rows.iter().flatten().map(String::as_str)
    }
}

/// Builds column-selection menus within transport limits.
#[derive(Debug, Clone)]
pub struct MenuBuilder {
    /// Cap on offered columns per menu.
    pub max_columns: usize,
    /// Distinct-value ceiling for treating a numeric column as categorical.
    pub categorical_cardinality: usize,
}

impl Default for MenuBuilder {
    fn default() -> Self {
        Self {
            max_columns: 30,
            categorical_cardinality: 10,
        }
    }
}

fn dup_suffix_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\.(\d+)$").expect("static regex"))
}

/// Display form of a column name. Duplicate headers are disambiguated at
/// load time with a `.N` suffix; show them as `Name (Dup N)` instead.
pub fn humanize(name: &str) -> String {
    dup_suffix_re().replace(name, " (Dup $1)").into_owned()
}

impl MenuBuilder {
    pub fn new(max_columns: usize, categorical_cardinality: usize) -> Self {
        Self {
            max_columns,
            categorical_cardinality,
        }
    }

    fn offered<'a>(&self, schema: &'a Schema, mode: SelectionMode) -> Vec<&'a str> {
        match mode {
            SelectionMode::All => schema.columns.iter().map(|c| c.name.as_str()).collect(),
            SelectionMode::NumericOnly => schema
                .columns
                .iter()
                .filter(|c| c.ty == ColumnType::Numeric)
                .map(|c| c.name.as_str())
                .collect(),
            SelectionMode::CategoricalOnly => {
                let mut cols: Vec<&str> = schema
                    .columns
                    .iter()
                    .filter(|c| c.ty != ColumnType::Numeric)
                    .map(|c| c.name.as_str())
                    .collect();
                // Low-cardinality numerics double as factors.
                cols.extend(
                    schema
                        .columns
                        .iter()
                        .filter(|c| {
                            c.ty == ColumnType::Numeric
                                && c.distinct < self.categorical_cardinality
                        })
                        .map(|c| c.name.as_str()),
                );
                cols
            }
        }
    }

    /// Build a menu over `schema` columns. `selected` items get the
    /// selected marker; `extra_controls` (e.g. "Done Selecting") are laid
    /// out on the final row before the back label.
    pub fn build(
        &self,
        schema: &Schema,
        mode: SelectionMode,
        selected: &[String],
        extra_controls: &[&str],
        back_label: &str,
    ) -> Menu {
        let items: Vec<String> = self
            .offered(schema, mode)
            .into_iter()
            .take(self.max_columns)
            .map(|name| {
                let display = humanize(name);
                if selected.iter().any(|s| s == name) {
                    format!("{SELECTED_MARKER}{display}")
                } else {
                    display
                }
            })
            .collect();

        let mut rows: Vec<Vec<String>> = items.chunks(2).map(|pair| pair.to_vec()).collect();

        let mut final_row: Vec<String> =
            extra_controls.iter().map(|c| c.to_string()).collect();
        final_row.push(back_label.to_string());
        rows.push(final_row);

        Menu {
            rows,
            back_label: back_label.to_string(),
        }
    }

    /// Resolve user input back to a real column name: strips the selected
    /// marker, reverses duplicate humanization, then matches exact →
    /// case-insensitive → substring, in that order.
    pub fn resolve_column(schema: &Schema, input: &str) -> Option<String> {
        let cleaned = input.trim().trim_start_matches(SELECTED_MARKER).trim();
        let candidates = [cleaned.to_string(), dehumanize(cleaned)];

        for candidate in &candidates {
            if let Some(col) = schema.columns.iter().find(|c| &c.name == candidate) {
                return Some(col.name.clone());
            }
        }
        let lower = cleaned.to_lowercase();
        if let Some(col) = schema
            .columns
            .iter()
            .find(|c| c.name.to_lowercase() == lower)
        {
            return Some(col.name.clone());
        }
        schema
            .columns
            .iter()
            .find(|c| {
                let name = c.name.to_lowercase();
                name.contains(&lower) || lower.contains(&name)
            })
            .map(|c| c.name.clone())
    }
}

/// Reverse of [`humanize`]: `Name (Dup 2)` → `Name.2`.
fn dehumanize(label: &str) -> String {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r" \(Dup (\d+)\)$").expect("static regex"));
    re.replace(label, ".$1").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::dataset::Column;

    fn schema() -> Schema {
        Schema {
            columns: vec![
                Column::new("Gender", ColumnType::Text, 2),
                Column::new("Score", ColumnType::Numeric, 40),
                Column::new("Grade", ColumnType::Numeric, 5),
                Column::new("Comment", ColumnType::Text, 38),
                Column::new("Score.1", ColumnType::Numeric, 40),
            ],
        }
    }

    #[test]
    fn categorical_mode_admits_low_cardinality_numerics() {
        let builder = MenuBuilder::default();
        let schema = schema();
        let offered = builder.offered(&schema, SelectionMode::CategoricalOnly);
        assert!(offered.contains(&"Gender"));
        assert!(offered.contains(&"Grade"));
        assert!(!offered.contains(&"Score"));
    }

    #[test]
    fn numeric_mode_excludes_text() {
        let builder = MenuBuilder::default();
        let schema = schema();
        let offered = builder.offered(&schema, SelectionMode::NumericOnly);
        assert_eq!(offered, ["Score", "Grade", "Score.1"]);
    }

    #[test]
    fn caps_offered_columns() {
        let many = Schema {
            columns: (0..50)
                .map(|i| Column::new(format!("V{i}"), ColumnType::Numeric, 50))
                .collect(),
        };
        let builder = MenuBuilder::default();
        let menu = builder.build(&many, SelectionMode::All, &[], &[], "Back");
        // 30 items in rows of 2, plus the control row.
        let item_count: usize = menu.rows.iter().take(menu.rows.len() - 1).map(Vec::len).sum();
        assert_eq!(item_count, 30);
    }

    #[test]
    fn duplicate_headers_are_humanized_and_resolvable() {
        assert_eq!(humanize("Score.1"), "Score (Dup 1)");
        assert_eq!(humanize("Score"), "Score");
        let resolved = MenuBuilder::resolve_column(&schema(), "Score (Dup 1)");
        assert_eq!(resolved.as_deref(), Some("Score.1"));
    }

    #[test]
    fn selected_items_get_marker_and_still_resolve() {
        let builder = MenuBuilder::default();
        let menu = builder.build(
            &schema(),
            SelectionMode::All,
            &["Gender".to_string()],
            &["✅ Done Selecting"],
            "◀️ Back to Menu",
        );
        assert!(menu.labels().any(|l| l == "✅ Gender"));
        let resolved = MenuBuilder::resolve_column(&schema(), "✅ Gender");
        assert_eq!(resolved.as_deref(), Some("Gender"));
        // Control row ends with the back label.
        assert_eq!(menu.rows.last().unwrap().last().unwrap(), "◀️ Back to Menu");
    }

    #[test]
    fn resolve_falls_back_to_case_insensitive_then_substring() {
        let s = schema();
        assert_eq!(
            MenuBuilder::resolve_column(&s, "gender").as_deref(),
            Some("Gender")
        );
        assert_eq!(
            MenuBuilder::resolve_column(&s, "Comm").as_deref(),
            Some("Comment")
        );
        assert_eq!(MenuBuilder::resolve_column(&s, "Missing"), None);
    }
}
