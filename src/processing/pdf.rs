use crate::error::{Result, TurBotError};

/// One page of extracted content: running text plus any tables detected on
/// the page, formatted as ` | `-joined rows.
#[derive(Debug, Clone)]
pub struct PageContent {
    pub page: u32,
    pub text: String,
    pub tables: Vec<String>,
}

/// PDF text and table extraction.
///
/// Tables are pulled out of the text stream so the chunker can keep price
/// and schedule rows intact as self-contained chunks.
#[derive(Debug, Clone, Default)]
pub struct PdfExtractor;

impl PdfExtractor {
    pub fn new() -> Self {
        Self
    }

    pub fn extract(&self, bytes: &[u8]) -> Result<Vec<PageContent>> {
        let text = pdf_extract::extract_text_from_mem(bytes)
            .map_err(|e| TurBotError::Processing(format!("PDF extraction failed: {e}")))?;

        Ok(split_pages(&text)
            .into_iter()
            .enumerate()
            .map(|(i, page_text)| {
                let (text, tables) = separate_tables(&page_text);
                PageContent {
                    page: (i + 1) as u32,
                    text,
                    tables,
                }
            })
            .filter(|p| !p.text.trim().is_empty() || !p.tables.is_empty())
            .collect())
    }
}

/// Pages come back separated by form feeds when the extractor preserves
/// them; otherwise the whole document counts as one page.
fn split_pages(text: &str) -> Vec<String> {
    if text.contains('\u{c}') {
        text.split('\u{c}').map(str::to_string).collect()
    } else {
        vec![text.to_string()]
    }
}

/// A line reads as tabular when it splits into 3+ columns on runs of
/// whitespace and carries at least one digit (prices, dates, durations).
fn is_tabular_line(line: &str) -> bool {
    let columns = split_columns(line);
    columns.len() >= 3 && line.chars().any(|c| c.is_ascii_digit())
}

fn split_columns(line: &str) -> Vec<&str> {
    line.split("  ")
        .flat_map(|part| part.split('\t'))
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect()
}

/// Separate tabular runs (2+ consecutive tabular lines) from prose. Tables
/// are reformatted with explicit column separators; a lone tabular-looking
/// line is just prose with numbers and stays where it was.
fn separate_tables(page_text: &str) -> (String, Vec<String>) {
    fn flush(run: &mut Vec<&str>, tables: &mut Vec<String>, prose: &mut Vec<String>) {
        if run.len() >= 2 {
            let formatted = run
                .iter()
                .map(|line| split_columns(line).join(" | "))
                .collect::<Vec<_>>()
                .join("\n");
            tables.push(formatted);
        } else {
            prose.extend(run.iter().map(|line| line.to_string()));
        }
        run.clear();
    }

    let mut prose: Vec<String> = Vec::new();
    let mut tables: Vec<String> = Vec::new();
    let mut run: Vec<&str> = Vec::new();

    for line in page_text.lines() {
        if is_tabular_line(line) {
            run.push(line);
        } else {
            flush(&mut run, &mut tables, &mut prose);
            prose.push(line.to_string());
        }
    }
    flush(&mut run, &mut tables, &mut prose);

    (prose.join("\n").trim().to_string(), tables)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_pages_on_form_feed() {
        let pages = split_pages("strana jedan\u{c}strana dva");
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0], "strana jedan");
    }

    #[test]
    fn test_split_pages_without_form_feed() {
        let pages = split_pages("sve na jednoj strani");
        assert_eq!(pages.len(), 1);
    }

    #[test]
    fn test_tabular_line_detection() {
        assert!(is_tabular_line("Hotel Roma  450 EUR  5 dana"));
        assert!(is_tabular_line("Polazak\t15.05.\t08:00"));
        assert!(!is_tabular_line("Ovo je običan pasus o putovanju."));
        // Columns without digits are headings, not data rows
        assert!(!is_tabular_line("Hotel  Cena  Trajanje"));
    }

    #[test]
    fn test_separate_tables_extracts_price_rows() {
        let page = "Aranžman za Rim u maju.\n\
                    Hotel Roma  450 EUR  5 dana\n\
                    Hotel Centar  380 EUR  4 dana\n\
                    Prijave na telefon.";

        let (prose, tables) = separate_tables(page);

        assert!(prose.contains("Aranžman za Rim"));
        assert!(prose.contains("Prijave na telefon"));
        assert_eq!(tables.len(), 1);
        assert!(tables[0].contains("Hotel Roma | 450 EUR | 5 dana"));
        assert!(!prose.contains("450 EUR"));
    }

    #[test]
    fn test_single_tabular_line_stays_in_prose() {
        let page = "Cena aranžmana iznosi:\nPaket  500 EUR  7 dana\nUplata u dve rate.";
        let (prose, tables) = separate_tables(page);
        assert!(tables.is_empty());
        assert!(prose.contains("Paket  500 EUR  7 dana"));
    }

    #[test]
    fn test_extract_rejects_invalid_pdf() {
        let extractor = PdfExtractor::new();
        let result = extractor.extract(b"this is not a pdf");
        assert!(matches!(result, Err(TurBotError::Processing(_))));
    }
}
