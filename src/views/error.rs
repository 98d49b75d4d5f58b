use axum::response::Html;

use super::{PageContext, layout};
use crate::i18n;

/// Generic failure page with a single retry action
pub fn render(ctx: &PageContext, retry_href: &str) -> Html<String> {
    let body = format!(
        r#"<section class="card center">
  <h1>{title}</h1>
  <p>{desc}</p>
  <a class="btn accent" href="{retry}">{retry_label}</a>
</section>"#,
        title = ctx.t("Error.title"),
        desc = ctx.t("Error.desc"),
        retry = super::escape(retry_href),
        retry_label = ctx.t("Error.retry"),
    );
    layout(ctx, &i18n::t(ctx.locale, "Error.title"), &body)
}
