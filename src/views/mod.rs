//! Server-rendered pages.
//!
//! Every page goes through `layout`, which draws the navbar (language
//! switcher, auth button with logout confirmation) and the footer. All
//! user-controlled text must pass through `escape`.

pub mod admin;
pub mod auth;
pub mod community;
pub mod contribute;
pub mod error;
pub mod home;
pub mod project;

use axum::response::Html;
use chrono::{Datelike, Utc};
use serde::{Deserialize, Serialize};

use crate::i18n::{self, Locale, t};

/// Signed-in user as shown in the navbar
#[derive(Debug, Clone)]
pub struct NavUser {
    pub name: String,
    pub is_admin: bool,
}

impl NavUser {
    /// Part of the email before `@`
    pub fn from_email(email: Option<&str>, is_admin: bool) -> Self {
        let name = email
            .and_then(|e| e.split('@').next())
            .filter(|n| !n.is_empty())
            .unwrap_or("IHearU")
            .to_string();
        Self { name, is_admin }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Success,
    Warning,
    Error,
}

impl NoticeKind {
    fn class(self) -> &'static str {
        match self {
            NoticeKind::Success => "notice ok",
            NoticeKind::Warning => "notice warn",
            NoticeKind::Error => "notice err",
        }
    }
}

/// One-shot message shown at the top of a page after a form post
#[derive(Debug, Clone)]
pub struct Notice {
    pub kind: NoticeKind,
    pub text: String,
}

/// Notice carried across a post/redirect/get round trip as query parameters.
///
/// `notice` is a catalog key; anything that is not a known key is ignored so
/// the query string cannot inject text into the page.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Flash {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed: Option<usize>,
}

impl Flash {
    pub fn new(kind: NoticeKind, key: &str) -> Self {
        let level = match kind {
            NoticeKind::Success => "ok",
            NoticeKind::Warning => "warn",
            NoticeKind::Error => "err",
        };
        Self {
            notice: Some(key.to_string()),
            level: Some(level.to_string()),
            ..Self::default()
        }
    }

    pub fn count(mut self, count: usize) -> Self {
        self.count = Some(count);
        self
    }

    pub fn failed(mut self, failed: usize) -> Self {
        self.failed = Some(failed);
        self
    }

    fn kind(&self) -> NoticeKind {
        match self.level.as_deref() {
            Some("ok") => NoticeKind::Success,
            Some("warn") => NoticeKind::Warning,
            _ => NoticeKind::Error,
        }
    }

    /// Localized text, or `None` for a missing or unknown key
    pub fn message(&self, locale: Locale) -> Option<(NoticeKind, String)> {
        let key = self.notice.as_deref()?;
        if !i18n::has(locale, key) {
            return None;
        }
        let count = self.count.unwrap_or(0).to_string();
        let failed = self.failed.unwrap_or(0).to_string();
        let text = i18n::tr(locale, key, &[("count", &count), ("failed", &failed)]);
        Some((self.kind(), text))
    }

    /// `notice=...&level=...` for appending to a redirect target
    pub fn query(&self) -> String {
        let mut parts = Vec::new();
        if let Some(n) = &self.notice {
            parts.push(format!("notice={n}"));
        }
        if let Some(l) = &self.level {
            parts.push(format!("level={l}"));
        }
        if let Some(c) = self.count {
            parts.push(format!("count={c}"));
        }
        if let Some(f) = self.failed {
            parts.push(format!("failed={f}"));
        }
        parts.join("&")
    }
}

pub struct PageContext {
    pub locale: Locale,
    /// Request path without the locale prefix, used by the language switcher
    pub path: String,
    pub user: Option<NavUser>,
    pub notices: Vec<Notice>,
}

impl PageContext {
    pub fn new(locale: Locale, path: impl Into<String>) -> Self {
        Self {
            locale,
            path: path.into(),
            user: None,
            notices: Vec::new(),
        }
    }

    pub fn with_user(mut self, user: Option<NavUser>) -> Self {
        self.user = user;
        self
    }

    pub fn notice(mut self, kind: NoticeKind, text: impl Into<String>) -> Self {
        self.notices.push(Notice {
            kind,
            text: text.into(),
        });
        self
    }

    pub fn flash(self, flash: &Flash) -> Self {
        match flash.message(self.locale) {
            Some((kind, text)) => self.notice(kind, text),
            None => self,
        }
    }

    pub fn t(&self, key: &str) -> String {
        escape(&t(self.locale, key))
    }

    pub fn href(&self, path: &str) -> String {
        href(self.locale, path)
    }
}

/// Localized link target: `/` -> `/it`, `/community` -> `/it/community`
pub fn href(locale: Locale, path: &str) -> String {
    if path == "/" || path.is_empty() {
        format!("/{locale}")
    } else {
        format!("/{locale}{path}")
    }
}

pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

fn auth_button(ctx: &PageContext) -> String {
    match &ctx.user {
        Some(user) => format!(
            r#"<span class="who">{name}</span>
<form method="post" action="/auth/logout" class="inline" onsubmit="return confirm('{title}\n{desc}')">
  <input type="hidden" name="locale" value="{locale}">
  <button type="submit" class="btn danger round" title="{logout}">{logout}</button>
</form>"#,
            name = escape(&user.name),
            title = js_string(&t(ctx.locale, "Auth.modal.title")),
            desc = js_string(&t(ctx.locale, "Auth.modal.desc")),
            locale = ctx.locale,
            logout = ctx.t("Auth.logout"),
        ),
        None => format!(
            r#"<a class="btn outline" href="{}">{}</a>"#,
            ctx.href("/login"),
            ctx.t("Auth.login")
        ),
    }
}

/// Escape text for a single-quoted JS string inside an HTML attribute
fn js_string(s: &str) -> String {
    escape(&s.replace('\\', "\\\\").replace('\'', "\\'"))
}

pub fn layout(ctx: &PageContext, title: &str, body: &str) -> Html<String> {
    let other = ctx.locale.other();
    let admin_link = match &ctx.user {
        Some(u) if u.is_admin => format!(
            r#"<a href="{}">{}</a>"#,
            ctx.href("/admin"),
            ctx.t("Navbar.admin")
        ),
        _ => String::new(),
    };
    let notices: String = ctx
        .notices
        .iter()
        .map(|n| format!(r#"<div class="{}">{}</div>"#, n.kind.class(), escape(&n.text)))
        .collect();

    Html(format!(
        r#"<!doctype html>
<html lang="{lang}">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{title} | IHearU</title>
<meta name="description" content="{description}">
<link rel="stylesheet" href="/static/style.css">
</head>
<body>
<nav class="navbar">
  <div class="left">
    <a href="{home}" class="brand"><span class="logo">I</span>IHearU</a>
    <a href="{switch}" class="lang" title="{switch_title}">{other_code}</a>
  </div>
  <div class="center">
    <a href="{project}">{mission}</a>
    <a href="{community}">{community_label}</a>
    {admin_link}
  </div>
  <div class="right">
    <a href="{contribute}" class="btn accent">{contribute_label}</a>
    {auth}
  </div>
</nav>
<main>
{notices}
{body}
</main>
<footer>&copy; {year} {footer}</footer>
</body>
</html>"#,
        lang = ctx.locale,
        title = escape(title),
        description = ctx.t("Meta.description"),
        home = ctx.href("/"),
        switch = href(other, &ctx.path),
        switch_title = ctx.t("Navbar.language"),
        other_code = other.as_str().to_uppercase(),
        project = ctx.href("/progetto"),
        mission = ctx.t("Navbar.mission"),
        community = ctx.href("/community"),
        community_label = ctx.t("Navbar.community"),
        admin_link = admin_link,
        contribute = ctx.href("/contribuisci"),
        contribute_label = ctx.t("Navbar.contribute"),
        auth = auth_button(ctx),
        notices = notices,
        body = body,
        year = Utc::now().year(),
        footer = ctx.t("Footer.text"),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_html_specials() {
        assert_eq!(
            escape(r#"<a href="x">Tom & 'Jerry'</a>"#),
            "&lt;a href=&quot;x&quot;&gt;Tom &amp; &#39;Jerry&#39;&lt;/a&gt;"
        );
    }

    #[test]
    fn localized_hrefs() {
        assert_eq!(href(Locale::En, "/"), "/en");
        assert_eq!(href(Locale::It, "/community"), "/it/community");
    }

    #[test]
    fn layout_switches_language_on_same_page() {
        let ctx = PageContext::new(Locale::It, "/community");
        let Html(page) = layout(&ctx, "Community", "<p>body</p>");
        assert!(page.contains(r#"href="/en/community""#));
        assert!(page.contains(r#"<html lang="it">"#));
        assert!(page.contains(r#"href="/it/login""#));
    }

    #[test]
    fn flash_only_renders_catalog_keys() {
        let flash = Flash::new(NoticeKind::Success, "Contribute.alerts.success").count(2);
        assert_eq!(flash.query(), "notice=Contribute.alerts.success&level=ok&count=2");
        let (kind, text) = flash.message(Locale::En).unwrap();
        assert_eq!(kind, NoticeKind::Success);
        assert_eq!(text, "2 videos uploaded successfully!");

        let forged = Flash {
            notice: Some("<script>".into()),
            ..Flash::default()
        };
        assert!(forged.message(Locale::En).is_none());
        let ctx = PageContext::new(Locale::En, "/").flash(&forged);
        assert!(ctx.notices.is_empty());
    }

    #[test]
    fn nav_user_name_from_email() {
        let u = NavUser::from_email(Some("maria.rossi@example.org"), false);
        assert_eq!(u.name, "maria.rossi");
        assert_eq!(NavUser::from_email(None, true).name, "IHearU");
    }
}
