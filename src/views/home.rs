use axum::response::Html;

use super::{PageContext, layout};
use crate::models::CommunityStats;

pub fn render(ctx: &PageContext, stats: CommunityStats) -> Html<String> {
    let steps: String = (1..=3)
        .map(|i| {
            format!(
                r#"<div class="card"><h3>{}</h3><p>{}</p></div>"#,
                ctx.t(&format!("Home.how_it_works.step{i}_title")),
                ctx.t(&format!("Home.how_it_works.step{i}_desc")),
            )
        })
        .collect();

    let body = format!(
        r#"<section class="hero">
  <span class="badge">{badge}</span>
  <h1>{prefix} <span class="hl">{highlight}</span></h1>
  <p class="lead">{subtitle}</p>
  <div class="actions">
    <a class="btn accent" href="{contribute}">{cta_contribute}</a>
    <a class="btn ghost" href="{project}">{cta_tech}</a>
  </div>
</section>
<section class="stats">
  <div><strong>{videos}</strong><span>{collected}</span></div>
  <div><strong>{words}</strong><span>{gestures}</span></div>
  <a href="{community}"><strong>{hall}</strong><span>{ranking}</span></a>
</section>
<section>
  <h2>{how_title}</h2>
  <p>{how_subtitle}</p>
  <div class="grid3">{steps}</div>
</section>"#,
        badge = ctx.t("Home.hero.badge"),
        prefix = ctx.t("Home.hero.title_prefix"),
        highlight = ctx.t("Home.hero.title_highlight"),
        subtitle = ctx.t("Home.hero.subtitle"),
        contribute = ctx.href("/contribuisci"),
        cta_contribute = ctx.t("Home.hero.cta_contribute"),
        project = ctx.href("/progetto"),
        cta_tech = ctx.t("Home.hero.cta_tech"),
        videos = stats.total_videos,
        collected = ctx.t("Home.stats.collected_signs"),
        words = stats.total_words,
        gestures = ctx.t("Home.stats.learned_gestures"),
        community = ctx.href("/community"),
        hall = ctx.t("Home.stats.hall_of_fame"),
        ranking = ctx.t("Home.stats.view_ranking"),
        how_title = ctx.t("Home.how_it_works.title"),
        how_subtitle = ctx.t("Home.how_it_works.subtitle"),
        steps = steps,
    );

    layout(ctx, &crate::i18n::t(ctx.locale, "Home.hero.badge"), &body)
}
