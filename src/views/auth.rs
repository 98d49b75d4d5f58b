//! Login, registration and the auth error page

use axum::response::Html;

use super::{PageContext, escape, js_string, layout};
use crate::i18n;

fn google_button(ctx: &PageContext, next: &str) -> String {
    format!(
        r#"<a class="btn outline wide" href="/auth/oauth/google?locale={locale}&next={next}">{label}</a>"#,
        locale = ctx.locale,
        next = escape(next),
        label = escape(&i18n::tr(
            ctx.locale,
            "Auth.supabase.social_provider_text",
            &[("provider", "Google")]
        )),
    )
}

fn credentials_fields(ctx: &PageContext) -> String {
    format!(
        r#"<label>{email}<input type="email" name="email" required autocomplete="email"></label>
<label>{password}<input type="password" name="password" required minlength="6"></label>"#,
        email = ctx.t("Auth.supabase.email_label"),
        password = ctx.t("Auth.supabase.password_label"),
    )
}

fn policy(ctx: &PageContext) -> String {
    format!(
        r#"<p class="small">{} <a href="{}">{}</a></p>"#,
        ctx.t("Auth.policy_text"),
        ctx.href("/progetto"),
        ctx.t("Auth.policy_link")
    )
}

/// Email/password form plus Google button. `next` is where the user lands
/// after signing in.
pub fn login(ctx: &PageContext, next: &str) -> Html<String> {
    let body = format!(
        r#"<a class="back" href="{home}">{back}</a>
<section class="auth card">
  <h1>{welcome} <span class="hl">{highlight}</span></h1>
  <p>{desc}</p>
  <form method="post" action="/auth/login" class="stack" onsubmit="this.querySelector('button').textContent='{loading}'">
    <input type="hidden" name="locale" value="{locale}">
    <input type="hidden" name="next" value="{next}">
    {fields}
    <button type="submit" class="btn accent wide">{button}</button>
  </form>
  {google}
  <p>{no_account} <a href="{register}">{create}</a></p>
  {policy}
</section>"#,
        home = ctx.href("/"),
        back = ctx.t("Auth.back_home"),
        welcome = ctx.t("Auth.welcome_title"),
        highlight = ctx.t("Auth.welcome_highlight"),
        desc = ctx.t("Auth.welcome_desc"),
        loading = js_string(&i18n::t(ctx.locale, "Auth.supabase.loading_button_label")),
        locale = ctx.locale,
        next = escape(next),
        fields = credentials_fields(ctx),
        button = ctx.t("Auth.supabase.button_label"),
        google = google_button(ctx, next),
        no_account = ctx.t("Auth.no_account"),
        register = ctx.href("/register"),
        create = ctx.t("Auth.create_account"),
        policy = policy(ctx),
    );
    layout(ctx, &i18n::t(ctx.locale, "Auth.login"), &body)
}

/// Registration form, or the waiting screen once a confirmation email is out
pub fn register(ctx: &PageContext, pending_email: Option<&str>) -> Html<String> {
    let content = match pending_email {
        Some(email) => format!(
            r#"<div class="notice ok">{waiting}</div>
<p class="small">{confirm}</p>
<script>
  (function () {{
    var events = new EventSource('/auth/events');
    events.addEventListener('signed_in', function () {{
      events.close();
      window.location.href = '{target}';
    }});
  }})();
</script>"#,
            waiting = escape(&i18n::tr(
                ctx.locale,
                "Auth.waiting_confirmation",
                &[("email", email)]
            )),
            confirm = ctx.t("Auth.supabase.confirmation_text"),
            target = ctx.href("/contribuisci"),
        ),
        None => format!(
            r#"<form method="post" action="/auth/register" class="stack">
  <input type="hidden" name="locale" value="{locale}">
  {fields}
  <button type="submit" class="btn accent wide">{button}</button>
</form>
{google}"#,
            locale = ctx.locale,
            fields = credentials_fields(ctx),
            button = ctx.t("Auth.supabase.register_button_label"),
            google = google_button(ctx, "/contribuisci"),
        ),
    };

    let body = format!(
        r#"<a class="back" href="{home}">{back}</a>
<section class="auth card">
  <h1>{title}</h1>
  <p>{subtitle}</p>
  {content}
  <p>{have_account} <a href="{login}">{login_link}</a></p>
  {policy}
</section>"#,
        home = ctx.href("/"),
        back = ctx.t("Auth.back_home"),
        title = ctx.t("Auth.register_title"),
        subtitle = ctx.t("Auth.register_subtitle"),
        content = content,
        have_account = ctx.t("Auth.have_account"),
        login = ctx.href("/login"),
        login_link = ctx.t("Auth.login_link"),
        policy = policy(ctx),
    );
    layout(ctx, &i18n::t(ctx.locale, "Auth.register_title"), &body)
}

pub fn code_error(ctx: &PageContext) -> Html<String> {
    let body = format!(
        r#"<section class="card center">
  <h1>{title}</h1>
  <p>{desc}</p>
  <a class="btn accent" href="{login}">{login_label}</a>
</section>"#,
        title = ctx.t("Auth.code_error_title"),
        desc = ctx.t("Auth.code_error_desc"),
        login = ctx.href("/login"),
        login_label = ctx.t("Auth.login"),
    );
    layout(ctx, &i18n::t(ctx.locale, "Auth.code_error_title"), &body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::i18n::Locale;

    #[test]
    fn login_keeps_next_and_escapes_it() {
        let ctx = PageContext::new(Locale::En, "/login");
        let Html(page) = login(&ctx, "/en/admin\"><x");
        assert!(page.contains(r#"name="next" value="/en/admin&quot;&gt;&lt;x""#));
        assert!(page.contains("Continue with Google"));
    }

    #[test]
    fn pending_register_listens_for_sign_in() {
        let ctx = PageContext::new(Locale::It, "/register");
        let Html(page) = register(&ctx, Some("maria@example.org"));
        assert!(page.contains("maria@example.org"));
        assert!(page.contains("new EventSource('/auth/events')"));
        assert!(page.contains("'/it/contribuisci'"));
        assert!(!page.contains(r#"action="/auth/register""#));
    }
}
