use std::collections::HashSet;

use crate::session::{Session, Sessions, HOST_NAME, USER_NAME};

const NAME_WIDTH: usize = 45;
const ARROW: &str = "→";
const KEY_HINT: &str = " 🔑";
const RECENT_HEADER: &str = "── RECENT SESSIONS ──────────────────────────────────────────────────────────────────────────";
const SEPARATOR: &str = "─────────────────────────────────────────────────────────────────────────────────────────────";

/// An entry of the session menu.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MenuItem {
    /// Header or separator line, cannot be chosen.
    Header(String),
    Selectable { label: String, name: String },
}

impl MenuItem {
    pub fn label(&self) -> &str {
        match self {
            MenuItem::Header(label) => label,
            MenuItem::Selectable { label, .. } => label,
        }
    }

    pub fn session_name(&self) -> Option<&str> {
        match self {
            MenuItem::Header(_) => None,
            MenuItem::Selectable { name, .. } => Some(name),
        }
    }

    pub fn is_selectable(&self) -> bool {
        matches!(self, MenuItem::Selectable { .. })
    }
}

/// Reverses the percent escapes PuTTY uses in session names.
pub fn unquote_display(s: &str) -> String {
    s.replace("%20", " ")
        .replace("%2F", "/")
        .replace("%5C", "\\")
        .replace("%3A", ":")
}

/// Uppercases the first letter and every letter following a space, `-`, `_` or `.`.
pub fn smart_title(s: &str) -> String {
    let mut titled = String::with_capacity(s.len());
    let mut boundary = true;
    for c in s.chars() {
        if boundary && c.is_ascii_alphabetic() {
            titled.push(c.to_ascii_uppercase());
        } else {
            titled.push(c);
        }
        boundary = c.is_whitespace() || matches!(c, '-' | '_' | '.');
    }
    titled
}

/// `[user@]host[:port]` as shown in the menu.
fn target(session: &Session) -> String {
    let mut target = String::new();
    if let Some(user) = session.get(USER_NAME).filter(|u| !u.is_empty()) {
        target.push_str(&unquote_display(user));
        target.push('@');
    }
    target.push_str(&unquote_display(session.get(HOST_NAME).unwrap_or("???")));
    if !session.has_default_port() {
        target.push(':');
        target.push_str(session.port());
    }
    target
}

/// Returns `(sort_key, label)` for one session.
pub fn format(name: &str, session: &Session) -> (String, String) {
    let titled = smart_title(&unquote_display(name));
    let key_hint = if session.key_file().is_some() { KEY_HINT } else { "" };
    let label = format!(
        "{:<width$.width$} {} {}{}",
        titled,
        ARROW,
        target(session),
        key_hint,
        width = NAME_WIDTH
    );
    (label.to_lowercase(), label)
}

fn selectable(name: &str, session: &Session) -> MenuItem {
    let (_, label) = format(name, session);
    MenuItem::Selectable {
        label,
        name: name.to_string(),
    }
}

/// Menu entries: recent sessions under a header first, then everything else sorted
/// case-insensitively by label.
pub fn generate_menu_items<'a>(
    sessions: &'a Sessions,
    recent_names: &'a [String],
) -> impl Iterator<Item = MenuItem> + 'a {
    let recent_set: HashSet<&str> = recent_names.iter().map(String::as_str).collect();

    let mut rest: Vec<(String, MenuItem)> = sessions
        .iter()
        .filter(|(name, _)| !recent_set.contains(name.as_str()))
        .map(|(name, session)| {
            let (sort_key, label) = format(name, session);
            let item = MenuItem::Selectable {
                label,
                name: name.clone(),
            };
            (sort_key, item)
        })
        .collect();
    rest.sort_by(|a, b| a.0.cmp(&b.0));

    let header = (!recent_names.is_empty()).then(|| MenuItem::Header(RECENT_HEADER.to_string()));
    let separator = (!recent_names.is_empty() && !rest.is_empty())
        .then(|| MenuItem::Header(SEPARATOR.to_string()));

    let recent = recent_names.iter().filter_map(move |name| {
        sessions
            .get(name)
            .map(|session| selectable(name, session))
    });

    header
        .into_iter()
        .chain(recent)
        .chain(separator)
        .chain(rest.into_iter().map(|(_, item)| item))
}
