use axum::response::Html;

use super::{PageContext, escape, js_string, layout};
use crate::i18n;
use crate::models::PendingContribution;

fn card(ctx: &PageContext, item: &PendingContribution) -> String {
    let player = match &item.signed_url {
        Some(url) => format!(
            r#"<video src="{}" controls preload="metadata" playsinline></video>"#,
            escape(url)
        ),
        None => format!(r#"<div class="no-player">{}</div>"#, ctx.t("Admin.no_player")),
    };
    let date = item.created_at.format("%d/%m/%Y %H:%M").to_string();

    format!(
        r#"<article class="card review">
  {player}
  <h3>{word}</h3>
  <p class="small">{uploaded}</p>
  <div class="actions">
    <form method="post" action="{approve}" class="inline"><button type="submit" class="btn accent">{approve_label}</button></form>
    <form method="post" action="{reject}" class="inline" onsubmit="return confirm('{confirm}')"><button type="submit" class="btn danger">{reject_label}</button></form>
  </div>
</article>"#,
        word = escape(&item.word),
        uploaded = escape(&i18n::tr(ctx.locale, "Admin.uploaded_on", &[("date", &date)])),
        approve = ctx.href(&format!("/admin/{}/approve", item.id)),
        approve_label = ctx.t("Admin.approve"),
        reject = ctx.href(&format!("/admin/{}/reject", item.id)),
        confirm = js_string(&i18n::t(ctx.locale, "Admin.reject_confirm")),
        reject_label = ctx.t("Admin.reject"),
    )
}

pub fn render(ctx: &PageContext, email: &str, items: &[PendingContribution]) -> Html<String> {
    let content = if items.is_empty() {
        format!(r#"<p class="empty">{}</p>"#, ctx.t("Admin.empty"))
    } else {
        let cards: String = items.iter().map(|i| card(ctx, i)).collect();
        format!(r#"<div class="grid3">{cards}</div>"#)
    };

    let body = format!(
        r#"<section class="hero small">
  <h1>{title}</h1>
  <p class="small">{who}</p>
</section>
{content}"#,
        title = ctx.t("Admin.title"),
        who = escape(&i18n::tr(ctx.locale, "Admin.authorized_as", &[("email", email)])),
    );
    layout(ctx, &i18n::t(ctx.locale, "Admin.title"), &body)
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::i18n::Locale;

    #[test]
    fn cards_fall_back_when_signing_failed() {
        let items = vec![
            PendingContribution {
                id: 11,
                video_path: "u/a.mp4".into(),
                word: "Casa".into(),
                created_at: Utc.with_ymd_and_hms(2025, 3, 4, 10, 30, 0).unwrap(),
                signed_url: Some("https://cdn.test/a.mp4?token=x&y=1".into()),
            },
            PendingContribution {
                id: 12,
                video_path: "u/b.mp4".into(),
                word: "Sole".into(),
                created_at: Utc.with_ymd_and_hms(2025, 3, 4, 9, 0, 0).unwrap(),
                signed_url: None,
            },
        ];
        let ctx = PageContext::new(Locale::En, "/admin");
        let Html(page) = render(&ctx, "admin@ihearu.it", &items);

        assert!(page.contains(r#"src="https://cdn.test/a.mp4?token=x&amp;y=1""#));
        assert!(page.contains("Preview unavailable"));
        assert!(page.contains("Uploaded on: 04/03/2025 10:30"));
        assert!(page.contains(r#"action="/en/admin/12/reject""#));
        assert!(page.contains("Access granted for: admin@ihearu.it"));
    }

    #[test]
    fn empty_queue_message() {
        let ctx = PageContext::new(Locale::En, "/admin");
        let Html(page) = render(&ctx, "a@b.it", &[]);
        assert!(page.contains("No videos waiting for approval!"));
    }
}
