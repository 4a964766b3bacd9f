//! HTML extraction for directory pages
//!
//! This module handles parsing portal HTML to extract:
//! - The session token embedded in the search form
//! - Result cards from a search result page
//! - Detail tab content, reduced to JSON documents
//!
//! Missing markup never fails: it yields no token, no cards, or an empty document.

use crate::crawler::fetcher::RecordSummary;
use crate::state::DetailTab;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::{Map, Value};
use url::Url;

/// Rows containing this marker are placeholders, not data
const NO_INFORMATION: &str = "Pas d'information";

/// Finds the session token in a landing page
///
/// Form actions are searched first, then the raw document.
///
/// # Arguments
///
/// * `html` - The landing page
/// * `pattern` - Regex whose first capture group is the token
///
/// # Returns
///
/// The token, or None if the page carries none
pub fn extract_token(html: &str, pattern: &Regex) -> Option<String> {
    let document = Html::parse_document(html);

    if let Ok(form_selector) = Selector::parse("form[action]") {
        for form in document.select(&form_selector) {
            if let Some(action) = form.value().attr("action") {
                if let Some(token) = capture_token(action, pattern) {
                    return Some(token);
                }
            }
        }
    }

    capture_token(html, pattern)
}

fn capture_token(text: &str, pattern: &Regex) -> Option<String> {
    pattern
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .filter(|token| !token.is_empty())
}

/// Parses every result card on a search result page
///
/// Cards without a detail link or without an identity are skipped.
///
/// # Arguments
///
/// * `html` - A result page
/// * `identity_param` - Query parameter of the detail link holding the identity
pub fn parse_result_cards(html: &str, identity_param: &str) -> Vec<RecordSummary> {
    let document = Html::parse_document(html);

    let (Ok(card_sel), Ok(link_sel), Ok(profession_sel), Ok(address_sel), Ok(phone_sel), Ok(email_sel)) = (
        Selector::parse("div.contenant_resultat"),
        Selector::parse("div.nom_prenom a[href]"),
        Selector::parse("div.profession"),
        Selector::parse("div.adresse"),
        Selector::parse("div.tel"),
        Selector::parse("div.mssante"),
    ) else {
        return Vec::new();
    };

    let mut cards = Vec::new();

    for card in document.select(&card_sel) {
        let Some(link) = card.select(&link_sel).next() else {
            continue;
        };
        let Some(href) = link.value().attr("href") else {
            continue;
        };

        let detail_params = link_params(href);
        let identity = detail_params
            .iter()
            .find(|(k, _)| k == identity_param)
            .map(|(_, v)| v.trim().to_string())
            .unwrap_or_default();
        if identity.is_empty() {
            continue;
        }

        // First profession block is the profession, the rest are workplaces
        let professions: Vec<String> = card
            .select(&profession_sel)
            .map(element_text)
            .filter(|t| !t.is_empty())
            .collect();

        cards.push(RecordSummary {
            identity,
            name: element_text(link),
            profession: professions.first().cloned(),
            organization: (professions.len() > 1).then(|| professions[1..].join(" | ")),
            address: first_text(card, &address_sel),
            phone: first_text(card, &phone_sel),
            email: first_text(card, &email_sel),
            detail_params,
        });
    }

    cards
}

/// Reduces a detail tab to a JSON document
///
/// The diplomas tab is grouped into `diplomas`, `other_diplomas` and
/// `authorisations`; the other tabs map section titles to label/value pairs
/// plus an `items` list for tables.
pub fn extract_tab_content(tab: DetailTab, html: &str) -> String {
    let value = match tab {
        DetailTab::Diplomas => extract_diplomas(html),
        DetailTab::Situation | DetailTab::Dossier | DetailTab::Personal => extract_sections(html),
    };
    value.to_string()
}

/// Generic section extraction for situation, dossier and personal tabs
fn extract_sections(html: &str) -> Value {
    let document = Html::parse_document(html);
    let mut data = Map::new();

    let (Ok(content_sel), Ok(item_sel)) = (
        Selector::parse("div[class*='contenu_']"),
        Selector::parse("h2, span, table"),
    ) else {
        return Value::Object(data);
    };

    let Some(content) = document.select(&content_sel).next() else {
        return Value::Object(data);
    };

    let mut section: Option<String> = None;
    let mut pending_label: Option<String> = None;

    for element in content.select(&item_sel) {
        let classes = element.value().attr("class").unwrap_or("").to_lowercase();

        match element.value().name() {
            "h2" => {
                let title = element_text(element);
                data.entry(title.clone())
                    .or_insert_with(|| Value::Object(Map::new()));
                section = Some(title);
                pending_label = None;
            }
            "span" if classes.contains("label") => {
                let text = element_text(element);
                pending_label = text
                    .contains(':')
                    .then(|| text.trim_end_matches(':').trim().to_string());
            }
            "span" if classes.contains("txt") => {
                let (Some(title), Some(label)) = (section.as_ref(), pending_label.take()) else {
                    continue;
                };
                let value = element_text(element);
                if value.is_empty() {
                    continue;
                }
                if let Some(Value::Object(fields)) = data.get_mut(title) {
                    fields.insert(label, Value::String(value));
                }
            }
            "table" => {
                let Some(title) = section.as_ref() else {
                    continue;
                };
                let rows = table_rows(element);
                if rows.is_empty() {
                    continue;
                }
                if let Some(Value::Object(fields)) = data.get_mut(title) {
                    let items = fields
                        .entry("items".to_string())
                        .or_insert_with(|| Value::Array(Vec::new()));
                    if let Value::Array(list) = items {
                        list.extend(rows);
                    }
                }
            }
            _ => {}
        }
    }

    Value::Object(data)
}

/// Diplomas tab extraction, grouped by the heading above each table
fn extract_diplomas(html: &str) -> Value {
    let document = Html::parse_document(html);
    let mut diplomas = Vec::new();
    let mut other_diplomas = Vec::new();
    let mut authorisations = Vec::new();

    if let Ok(selector) = Selector::parse("h2, table.cellspacingNone") {
        let mut heading = String::new();

        for element in document.select(&selector) {
            if element.value().name() == "h2" {
                heading = element_text(element).to_uppercase();
                continue;
            }

            let rows = table_rows(element);
            // "AUTRES DIPLÔMES" also mentions diplomas, so it is checked first
            if heading.contains("AUTRE") {
                other_diplomas.extend(rows);
            } else if heading.contains("AUTORISATION") {
                authorisations.extend(rows);
            } else if heading.contains("DIPLÔM") || heading.contains("DIPLOM") {
                diplomas.extend(rows);
            }
        }
    }

    let mut data = Map::new();
    data.insert("diplomas".to_string(), Value::Array(diplomas));
    data.insert("other_diplomas".to_string(), Value::Array(other_diplomas));
    data.insert("authorisations".to_string(), Value::Array(authorisations));
    Value::Object(data)
}

/// Turns a table into one object per data row, keyed by the header cells
fn table_rows(table: ElementRef<'_>) -> Vec<Value> {
    let (Ok(row_sel), Ok(th_sel), Ok(td_sel)) = (
        Selector::parse("tr"),
        Selector::parse("th"),
        Selector::parse("td"),
    ) else {
        return Vec::new();
    };

    let rows: Vec<ElementRef<'_>> = table.select(&row_sel).collect();
    let Some((header_row, data_rows)) = rows.split_first() else {
        return Vec::new();
    };

    let headers: Vec<String> = header_row.select(&th_sel).map(element_text).collect();

    data_rows
        .iter()
        .filter_map(|row| {
            let cells: Vec<String> = row.select(&td_sel).map(element_text).collect();
            if cells.iter().all(|c| c.is_empty()) || cells.join(" ").contains(NO_INFORMATION) {
                return None;
            }
            let object: Map<String, Value> = headers
                .iter()
                .cloned()
                .zip(cells.into_iter().map(Value::String))
                .collect();
            Some(Value::Object(object))
        })
        .collect()
}

/// Query parameters of a (possibly relative) link
fn link_params(href: &str) -> Vec<(String, String)> {
    let Ok(base) = Url::parse("https://directory.invalid/") else {
        return Vec::new();
    };
    match base.join(href.trim()) {
        Ok(url) => url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect(),
        Err(_) => Vec::new(),
    }
}

/// Element text with whitespace collapsed
fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

fn first_text(scope: ElementRef<'_>, selector: &Selector) -> Option<String> {
    scope
        .select(selector)
        .next()
        .map(element_text)
        .filter(|t| !t.is_empty())
}
