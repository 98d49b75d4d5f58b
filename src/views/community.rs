use axum::response::Html;

use super::{PageContext, escape, layout};
use crate::models::{CommunityStats, Profile};

fn ranking_row(ctx: &PageContext, position: usize, profile: &Profile) -> String {
    let name = profile
        .display_name()
        .map(escape)
        .unwrap_or_else(|| ctx.t("Community.ranking.anonymous"));
    let avatar = match &profile.avatar_url {
        Some(url) if !url.is_empty() => format!(r#"<img class="avatar" src="{}" alt="">"#, escape(url)),
        _ => format!(
            r#"<span class="avatar">{}</span>"#,
            profile.initial().unwrap_or('A')
        ),
    };
    format!(
        r#"<li><span class="pos">#{position}</span>{avatar}<div><p class="name">{name}</p><p class="role">{role}</p></div><div class="count"><strong>{uploads}</strong> <span>{video}</span></div></li>"#,
        role = ctx.t("Community.ranking.role_label"),
        uploads = profile.uploads(),
        video = ctx.t("Community.ranking.video_label"),
    )
}

pub fn render(ctx: &PageContext, stats: CommunityStats, leaders: &[Profile]) -> Html<String> {
    let ranking = if leaders.is_empty() {
        format!(
            r#"<div class="empty"><p>{}</p><p>{}</p></div>"#,
            ctx.t("Community.ranking.empty_title"),
            ctx.t("Community.ranking.empty_desc")
        )
    } else {
        let rows: String = leaders
            .iter()
            .enumerate()
            .map(|(i, p)| ranking_row(ctx, i + 1, p))
            .collect();
        format!(r#"<ol class="ranking">{rows}</ol>"#)
    };

    let body = format!(
        r#"<a class="back" href="{home}">{back}</a>
<section class="hero">
  <h1>{prefix} <span class="hl">{highlight}</span></h1>
  <p class="lead">{subtitle}</p>
</section>
<section class="stats">
  <div><strong>{videos}</strong><span>{videos_label}</span></div>
  <div><strong>{words}</strong><span>{words_label}</span></div>
  <div><strong>{minutes}</strong><span>{minutes_label}</span></div>
</section>
<section class="card">
  <h2>{ranking_title}</h2>
  {ranking}
</section>
<section class="cta"><a class="btn accent" href="{contribute}">{cta}</a></section>"#,
        home = ctx.href("/"),
        back = ctx.t("Community.back_home"),
        prefix = ctx.t("Community.title_prefix"),
        highlight = ctx.t("Community.title_highlight"),
        subtitle = ctx.t("Community.subtitle"),
        videos = stats.total_videos,
        videos_label = ctx.t("Community.stats.videos_sent"),
        words = stats.total_words,
        words_label = ctx.t("Community.stats.learned_gestures"),
        minutes = stats.data_minutes(),
        minutes_label = ctx.t("Community.stats.data_minutes"),
        ranking_title = ctx.t("Community.ranking.title"),
        ranking = ranking,
        contribute = ctx.href("/contribuisci"),
        cta = ctx.t("Community.cta"),
    );

    layout(ctx, &crate::i18n::t(ctx.locale, "Navbar.community"), &body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::i18n::Locale;

    fn profile(name: Option<&str>, uploads: i64) -> Profile {
        Profile {
            username: name.map(String::from),
            avatar_url: None,
            total_uploads: Some(uploads),
        }
    }

    #[test]
    fn ranking_uses_anonymous_fallback_and_minutes() {
        let ctx = PageContext::new(Locale::En, "/community");
        let stats = CommunityStats {
            total_videos: 120,
            total_words: 40,
        };
        let Html(page) = render(&ctx, stats, &[profile(Some("<b>luca</b>"), 9), profile(None, 3)]);

        assert!(page.contains("&lt;b&gt;luca&lt;/b&gt;"));
        assert!(page.contains("Anonymous"));
        assert!(page.contains("<strong>10</strong>"));
        assert!(page.contains(r#"<span class="avatar">A</span>"#));
    }

    #[test]
    fn empty_ranking_message() {
        let ctx = PageContext::new(Locale::It, "/community");
        let Html(page) = render(&ctx, CommunityStats::default(), &[]);
        assert!(page.contains("Ancora nessun contributo."));
    }
}
