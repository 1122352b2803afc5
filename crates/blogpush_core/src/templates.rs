//! Markdown snippets inserted by the editor toolbar.

use serde::{Deserialize, Serialize};

/// Image placeholder.
pub const IMAGE: &str = "\n\n![image description](https://example.com/image.png)\n";

/// Blockquote tip.
pub const QUOTE: &str = "\n\n> 💡 Tip: contents...\n";

/// Inline link.
pub const LINK: &str = "\n\n[link description](https://example.com)\n";

/// Fenced code block.
pub const CODE: &str = "\n```javascript\nconsole.log('Hello Markdown!');\n```";

/// Fenced code block using diff annotations.
pub const CODE_DIFF: &str = "\n```javascript
// [!code ++]
console.log('Hello Markdown!');

// [!code --:3]
console.log('Hello Markdown!');
console.log('Hello Markdown!');
console.log('Hello Markdown!');
```";

/// What the Tab key inserts.
pub const TAB: &str = "  ";

/// Column bounds for [`table`].
pub const TABLE_COLUMNS: std::ops::RangeInclusive<usize> = 1..=10;

/// A fixed toolbar snippet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Template {
    /// [`IMAGE`]
    Image,
    /// [`QUOTE`]
    Quote,
    /// [`LINK`]
    Link,
    /// [`CODE`]
    Code,
    /// [`CODE_DIFF`]
    CodeDiff,
}

impl Template {
    /// Every template, in toolbar order.
    pub const ALL: [Template; 5] = [
        Template::Image,
        Template::Quote,
        Template::CodeDiff,
        Template::Code,
        Template::Link,
    ];

    /// Snippet text.
    pub fn text(self) -> &'static str {
        match self {
            Template::Image => IMAGE,
            Template::Quote => QUOTE,
            Template::Link => LINK,
            Template::Code => CODE,
            Template::CodeDiff => CODE_DIFF,
        }
    }
}

/// A header row, separator and one value row for a table of `columns`
/// columns, clamped to [`TABLE_COLUMNS`].
pub fn table(columns: usize) -> String {
    let columns = columns.clamp(*TABLE_COLUMNS.start(), *TABLE_COLUMNS.end());
    let row = |prefix: &str| {
        (1..=columns)
            .map(|i| format!("{prefix}{i}"))
            .collect::<Vec<_>>()
            .join(" | ")
    };
    let separators = vec!["---"; columns].join(" | ");
    format!(
        "| {} |\n| {} |\n| {} |",
        row("Header"),
        separators,
        row("Value")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_column_table() {
        assert_eq!(
            table(2),
            "| Header1 | Header2 |\n| --- | --- |\n| Value1 | Value2 |"
        );
    }

    #[test]
    fn test_table_columns_are_clamped() {
        assert_eq!(table(0), "| Header1 |\n| --- |\n| Value1 |");
        assert_eq!(table(50).matches("Header").count(), 10);
    }

    #[test]
    fn test_templates_start_on_new_line() {
        for template in Template::ALL {
            assert!(template.text().starts_with('\n'), "{template:?}");
        }
    }
}
