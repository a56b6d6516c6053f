//! Portal form scraping.
//!
//! The portal rejects posts that do not echo its hidden fields (view state,
//! event validation), so every post starts from the fields scraped off the
//! page that holds the form. Actions are either named submit controls or
//! `__doPostBack` link targets; both are opaque control ids.

use scraper::{ElementRef, Html, Selector};

use crate::errors::{CollarError, Result};

pub const EVENT_TARGET_FIELD: &str = "__EVENTTARGET";
pub const EVENT_ARGUMENT_FIELD: &str = "__EVENTARGUMENT";

const POSTBACK_CALL: &str = "__doPostBack(";

/// One `<form>` of a portal page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortalForm {
    /// The `action` attribute, unresolved. `None` posts back to the page.
    pub action: Option<String>,
    /// Named fields the browser would submit, in document order.
    pub fields: Vec<(String, String)>,
    /// Submit controls as (name, value).
    pub controls: Vec<(String, String)>,
    /// Control ids reachable through `__doPostBack` links.
    pub postback_targets: Vec<String>,
    /// Names of password inputs.
    pub password_fields: Vec<String>,
}

impl PortalForm {
    /// Every action id this form can submit.
    pub fn action_ids(&self) -> impl Iterator<Item = &str> {
        self.controls
            .iter()
            .map(|(name, _)| name.as_str())
            .chain(self.postback_targets.iter().map(String::as_str))
    }

    pub fn has_action(&self, action_id: &str) -> bool {
        self.action_ids().any(|id| id == action_id)
    }

    /// Value of the field called `name`.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v.as_str())
    }

    /// Sets `name` to `value`, replacing an existing field of that name.
    pub fn set_field(&mut self, name: &str, value: &str) {
        match self.fields.iter_mut().find(|(n, _)| n == name) {
            Some(field) => field.1 = value.to_string(),
            None => self.fields.push((name.to_string(), value.to_string())),
        }
    }

    /// Fields to post when activating `action_id`, or `None` if the form has
    /// no such control.
    ///
    /// A submit control adds itself as a name/value pair. A postback link
    /// fills `__EVENTTARGET` instead.
    pub fn submission(&self, action_id: &str) -> Option<Vec<(String, String)>> {
        let mut form = self.clone();
        if let Some((name, value)) = self.controls.iter().find(|(name, _)| name == action_id) {
            form.fields.push((name.clone(), value.clone()));
        } else if self.postback_targets.iter().any(|t| t == action_id) {
            form.set_field(EVENT_TARGET_FIELD, action_id);
            form.set_field(EVENT_ARGUMENT_FIELD, "");
        } else {
            return None;
        }
        Some(form.fields)
    }
}

fn selector(css: &'static str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| CollarError::parse("selector", format!("{css}: {e:?}")))
}

/// Extracts every form of an HTML page.
pub fn parse_forms(html: &str) -> Result<Vec<PortalForm>> {
    let document = Html::parse_document(html);
    let form_sel = selector("form")?;
    let field_sel = selector("input, select, textarea, button")?;
    let option_sel = selector("option")?;
    let link_sel = selector("a[href]")?;

    let mut forms = Vec::new();
    for form in document.select(&form_sel) {
        let mut parsed = PortalForm {
            action: form
                .value()
                .attr("action")
                .map(str::trim)
                .filter(|a| !a.is_empty())
                .map(String::from),
            ..PortalForm::default()
        };

        for element in form.select(&field_sel) {
            collect_field(&mut parsed, element, &option_sel);
        }

        for link in form.select(&link_sel) {
            if let Some(target) = link.value().attr("href").and_then(postback_target) {
                if !parsed.postback_targets.contains(&target) {
                    parsed.postback_targets.push(target);
                }
            }
        }
        forms.push(parsed);
    }
    Ok(forms)
}

fn collect_field(form: &mut PortalForm, element: ElementRef<'_>, option_sel: &Selector) {
    let el = element.value();
    let Some(name) = el.attr("name").filter(|n| !n.is_empty()) else {
        return;
    };
    let name = name.to_string();
    let value = el.attr("value").unwrap_or_default().to_string();

    match el.name() {
        "button" => {
            if el.attr("type").map_or(true, |t| t.eq_ignore_ascii_case("submit")) {
                form.controls.push((name, value));
            }
        }
        "select" => {
            let mut options = element.select(option_sel);
            let chosen = element
                .select(option_sel)
                .find(|o| o.value().attr("selected").is_some())
                .or_else(|| options.next());
            if let Some(option) = chosen {
                let value = option
                    .value()
                    .attr("value")
                    .map(String::from)
                    .unwrap_or_else(|| option.text().collect::<String>().trim().to_string());
                form.fields.push((name, value));
            }
        }
        "textarea" => form.fields.push((name, element.text().collect())),
        _ => {
            let kind = el.attr("type").unwrap_or("text").to_ascii_lowercase();
            match kind.as_str() {
                "submit" | "image" => form.controls.push((name, value)),
                "button" | "reset" | "file" => {}
                "checkbox" | "radio" => {
                    if el.attr("checked").is_some() {
                        let value = if value.is_empty() { "on".to_string() } else { value };
                        form.fields.push((name, value));
                    }
                }
                "password" => {
                    form.password_fields.push(name.clone());
                    form.fields.push((name, value));
                }
                _ => form.fields.push((name, value)),
            }
        }
    }
}

/// First argument of a `javascript:__doPostBack('target','')` link.
fn postback_target(href: &str) -> Option<String> {
    let start = href.find(POSTBACK_CALL)? + POSTBACK_CALL.len();
    let rest = href[start..].trim_start();
    let quote = rest.chars().next().filter(|c| *c == '\'' || *c == '"')?;
    let rest = &rest[1..];
    let end = rest.find(quote)?;
    let target = &rest[..end];
    (!target.is_empty()).then(|| target.to_string())
}

/// Whether any form of the page asks for a password in `field`.
pub fn has_password_field(forms: &[PortalForm], field: &str) -> bool {
    forms
        .iter()
        .any(|f| f.password_fields.iter().any(|p| p == field))
}
