use axum::response::Html;

use super::{PageContext, layout};

pub fn render(ctx: &PageContext) -> Html<String> {
    let grid: String = ["data_problem", "crowdsourcing", "training"]
        .iter()
        .map(|k| {
            format!(
                r#"<div class="card"><h3>{}</h3><p>{}</p></div>"#,
                ctx.t(&format!("Project.grid.{k}.title")),
                ctx.t(&format!("Project.grid.{k}.desc")),
            )
        })
        .collect();

    let body = format!(
        r#"<a class="back" href="{home}">{back}</a>
<section class="hero">
  <span class="badge">{badge}</span>
  <h1>{prefix} <span class="hl">{highlight}</span></h1>
  <p class="lead">{subtitle}</p>
</section>
<section class="card">
  <h2>{core}</h2>
  <ul><li>{privacy}</li><li>{precision}</li><li>{light}</li></ul>
</section>
<div class="grid3">{grid}</div>
<section class="cta">
  <h2>{cta_title}</h2>
  <p>{cta_desc}</p>
  <a class="btn accent" href="{contribute}">{cta_button}</a>
</section>"#,
        home = ctx.href("/"),
        back = ctx.t("Project.back_home"),
        badge = ctx.t("Project.header.badge"),
        prefix = ctx.t("Project.header.title_prefix"),
        highlight = ctx.t("Project.header.title_highlight"),
        subtitle = ctx.t("Project.header.subtitle"),
        core = ctx.t("Project.core.title"),
        privacy = ctx.t("Project.core.list.privacy"),
        precision = ctx.t("Project.core.list.precision"),
        light = ctx.t("Project.core.list.light"),
        grid = grid,
        cta_title = ctx.t("Project.cta.title"),
        cta_desc = ctx.t("Project.cta.desc"),
        contribute = ctx.href("/contribuisci"),
        cta_button = ctx.t("Project.cta.button"),
    );

    layout(ctx, &crate::i18n::t(ctx.locale, "Project.header.badge"), &body)
}
