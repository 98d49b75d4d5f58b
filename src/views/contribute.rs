//! The contribute page: word picker, capture tabs, queue and submission.

use axum::response::Html;
use serde::Deserialize;

use super::{PageContext, escape, js_string, layout};
use crate::i18n;
use crate::models::Word;
use crate::upload::SubmissionQueue;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tab {
    #[default]
    Upload,
    Webcam,
}

pub struct ContributeForm<'a> {
    pub words: &'a [Word],
    pub selected_word: Option<i64>,
    pub tab: Tab,
    pub queue: &'a SubmissionQueue,
}

fn instructions(ctx: &PageContext) -> String {
    let angles: String = ["left", "center", "right"]
        .iter()
        .map(|a| {
            format!(
                r#"<div class="angle"><span class="badge">{}</span><h4>{}</h4><p>{}</p></div>"#,
                ctx.t(&format!("Contribute.instructions.angles.{a}_label")),
                ctx.t(&format!("Contribute.instructions.angles.{a}_title")),
                ctx.t(&format!("Contribute.instructions.angles.{a}_desc")),
            )
        })
        .collect();
    format!(
        r#"<section class="card">
  <h2>{title}</h2>
  <p>{desc}</p>
  <div class="grid3">{angles}</div>
  <p class="small">{hint}</p>
</section>"#,
        title = ctx.t("Contribute.instructions.title"),
        desc = ctx.t("Contribute.instructions.desc"),
        hint = ctx.t("Contribute.instructions.hint"),
    )
}

fn word_select(ctx: &PageContext, words: &[Word], selected: Option<i64>) -> String {
    let options: String = words
        .iter()
        .map(|w| {
            let sel = if Some(w.id) == selected { " selected" } else { "" };
            format!(r#"<option value="{}"{sel}>{}</option>"#, w.id, escape(&w.text))
        })
        .collect();
    format!(
        r#"<label for="word-select">{label}</label>
<select id="word-select" name="word_id" form="submit-form" onchange="document.querySelectorAll('.word-mirror').forEach(function (i) {{ i.value = this.value; }}, this)">
  <option value="">{placeholder}</option>
  {options}
</select>"#,
        label = ctx.t("Contribute.form.select_label"),
        placeholder = ctx.t("Contribute.form.select_placeholder"),
    )
}

fn word_mirror(selected: Option<i64>) -> String {
    format!(
        r#"<input type="hidden" name="word" class="word-mirror" value="{}">"#,
        selected.map(|id| id.to_string()).unwrap_or_default()
    )
}

fn tabs(ctx: &PageContext, form: &ContributeForm<'_>) -> String {
    let link = |tab: &str, label: &str, active: bool| {
        let word = form
            .selected_word
            .map(|id| format!("&word={id}"))
            .unwrap_or_default();
        format!(
            r#"<a class="tab{}" href="{}?tab={tab}{word}">{}</a>"#,
            if active { " active" } else { "" },
            ctx.href("/contribuisci"),
            ctx.t(label)
        )
    };
    format!(
        r#"<div class="tabs">{}{}</div>"#,
        link("upload", "Contribute.form.tabs.upload", form.tab == Tab::Upload),
        link("webcam", "Contribute.form.tabs.webcam", form.tab == Tab::Webcam),
    )
}

fn upload_panel(ctx: &PageContext, selected: Option<i64>) -> String {
    format!(
        r#"<form method="post" enctype="multipart/form-data" action="{action}" class="dropzone">
  {mirror}
  <p class="title">{title}</p>
  <p class="small">{subtitle}</p>
  <input type="file" name="videos" accept="video/*" multiple required>
  <button type="submit" class="btn outline">{button}</button>
</form>"#,
        action = ctx.href("/contribuisci/queue"),
        mirror = word_mirror(selected),
        title = ctx.t("Contribute.form.dropzone.title"),
        subtitle = ctx.t("Contribute.form.dropzone.subtitle"),
        button = ctx.t("Contribute.form.dropzone.button"),
    )
}

/// Markup driven by `/static/recorder.js`; labels travel as data attributes
fn webcam_panel(ctx: &PageContext) -> String {
    let data = |key: &str| escape(&i18n::t(ctx.locale, key));
    format!(
        r#"<div id="recorder" class="recorder"
  data-endpoint="{endpoint}"
  data-queue="{queue}"
  data-label-processing="{processing}"
  data-label-unavailable="{unavailable}"
  data-label-get-ready="{get_ready}"
  data-label-accepted="{accepted}"
  data-label-clip-failed="{clip_failed}">
  <div class="screen">
    <p id="recorder-status" class="status">{loading}</p>
    <video id="recorder-live" autoplay muted playsinline></video>
    <video id="recorder-playback" controls playsinline hidden></video>
    <span id="recorder-countdown" class="countdown" hidden></span>
    <span id="recorder-rec" class="rec" hidden>REC</span>
  </div>
  <div class="controls">
    <button type="button" id="recorder-start" class="btn accent" disabled>{start}</button>
    <button type="button" id="recorder-stop" class="btn danger" hidden>{stop}</button>
    <button type="button" id="recorder-retry" class="btn outline" hidden>{retry}</button>
    <button type="button" id="recorder-accept" class="btn accent" hidden>{accept}</button>
  </div>
  <p class="small">{note}</p>
</div>
<script src="/static/recorder.js" defer></script>"#,
        endpoint = ctx.href("/contribuisci/recorder"),
        queue = ctx.href("/contribuisci?tab=webcam"),
        processing = data("Recorder.processing"),
        unavailable = data("Recorder.unavailable"),
        get_ready = data("Recorder.get_ready"),
        accepted = data("Recorder.accepted"),
        clip_failed = data("Recorder.clip_failed"),
        loading = ctx.t("Recorder.loading_camera"),
        start = ctx.t("Recorder.start"),
        stop = ctx.t("Recorder.stop"),
        retry = ctx.t("Recorder.retry"),
        accept = ctx.t("Recorder.accept"),
        note = ctx.t("Contribute.form.webcam_note"),
    )
}

fn size_label(bytes: usize) -> String {
    format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
}

fn queue_list(ctx: &PageContext, queue: &SubmissionQueue, selected: Option<i64>) -> String {
    if queue.is_empty() {
        return format!(r#"<p class="empty">{}</p>"#, ctx.t("Contribute.queue.empty"));
    }
    let items: String = queue
        .iter()
        .enumerate()
        .map(|(i, file)| {
            format!(
                r#"<li><span class="name">{name}</span><span class="size">{size}</span>
<form method="post" action="{action}" class="inline">{mirror}<button type="submit" class="btn link">{remove}</button></form></li>"#,
                name = escape(&file.name),
                size = size_label(file.size),
                action = ctx.href(&format!("/contribuisci/queue/{i}/remove")),
                mirror = word_mirror(selected),
                remove = ctx.t("Contribute.queue.remove"),
            )
        })
        .collect();
    format!(
        r#"<ul class="queue">{items}</ul>
<form method="post" action="{clear}" class="inline">{mirror}<button type="submit" class="btn link danger">{clear_label}</button></form>"#,
        clear = ctx.href("/contribuisci/queue/clear"),
        mirror = word_mirror(selected),
        clear_label = ctx.t("Contribute.queue.clear_all"),
    )
}

pub fn render(ctx: &PageContext, form: &ContributeForm<'_>) -> Html<String> {
    let panel = match form.tab {
        Tab::Upload => upload_panel(ctx, form.selected_word),
        Tab::Webcam => webcam_panel(ctx),
    };
    let count = form.queue.len().to_string();

    let body = format!(
        r#"<a class="back" href="{home}">{back}</a>
<section class="hero small">
  <h1>{title} <span class="hl">{highlight}</span></h1>
  <p class="lead">{subtitle}</p>
</section>
{instructions}
<section class="card">
  {select}
  {tabs}
  {panel}
</section>
<section class="card">
  <h2>{queue_title} ({count})</h2>
  {queue}
</section>
<form id="submit-form" method="post" action="{submit}" class="card" onsubmit="this.querySelector('button').disabled=true;this.querySelector('button').textContent='{loading}'">
  <label class="consent"><input type="checkbox" name="consent" value="on">
    <span><strong>{terms_label}</strong> {terms1} <span class="hl">{terms_hl}</span> {terms2}</span>
  </label>
  <button type="submit" class="btn accent wide">{submit_label}</button>
</form>"#,
        home = ctx.href("/"),
        back = ctx.t("Contribute.header.back_home"),
        title = ctx.t("Contribute.header.title"),
        highlight = ctx.t("Contribute.header.title_highlight"),
        subtitle = ctx.t("Contribute.header.subtitle"),
        instructions = instructions(ctx),
        select = word_select(ctx, form.words, form.selected_word),
        tabs = tabs(ctx, form),
        panel = panel,
        queue_title = ctx.t("Contribute.queue.title"),
        count = count,
        queue = queue_list(ctx, form.queue, form.selected_word),
        submit = ctx.href("/contribuisci/submit"),
        loading = js_string(&i18n::t(ctx.locale, "Contribute.submit.loading")),
        terms_label = ctx.t("Contribute.terms.label"),
        terms1 = ctx.t("Contribute.terms.text_part1"),
        terms_hl = ctx.t("Contribute.terms.text_highlight"),
        terms2 = ctx.t("Contribute.terms.text_part2"),
        submit_label = escape(&i18n::tr(
            ctx.locale,
            "Contribute.submit.button_single",
            &[("count", &count)]
        )),
    );
    layout(ctx, &i18n::t(ctx.locale, "Navbar.contribute"), &body)
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::i18n::Locale;
    use crate::upload::QueuedFile;

    fn words() -> Vec<Word> {
        vec![
            Word {
                id: 1,
                text: "Ciao".into(),
            },
            Word {
                id: 2,
                text: "Grazie".into(),
            },
        ]
    }

    #[test]
    fn renders_queue_and_selected_word() {
        let mut queue = SubmissionQueue::new();
        queue.append(QueuedFile::new(
            "<clip>.mp4",
            "video/mp4",
            Bytes::from(vec![0u8; 1024 * 1024]),
        ));
        let words = words();
        let ctx = PageContext::new(Locale::En, "/contribuisci");
        let Html(page) = render(
            &ctx,
            &ContributeForm {
                words: &words,
                selected_word: Some(2),
                tab: Tab::Upload,
                queue: &queue,
            },
        );

        assert!(page.contains(r#"<option value="2" selected>Grazie</option>"#));
        assert!(page.contains("&lt;clip&gt;.mp4"));
        assert!(page.contains("1.0 MB"));
        assert!(page.contains(r#"action="/en/contribuisci/queue/0/remove""#));
        assert!(page.contains("Send 1 videos"));
        assert!(page.contains(r#"accept="video/*""#));
        assert!(!page.contains("recorder.js"));
    }

    #[test]
    fn webcam_tab_loads_recorder() {
        let queue = SubmissionQueue::new();
        let ctx = PageContext::new(Locale::It, "/contribuisci");
        let Html(page) = render(
            &ctx,
            &ContributeForm {
                words: &[],
                selected_word: None,
                tab: Tab::Webcam,
                queue: &queue,
            },
        );
        assert!(page.contains(r#"data-endpoint="/it/contribuisci/recorder""#));
        assert!(page.contains("/static/recorder.js"));
        assert!(page.contains(r#"class="tab active" href="/it/contribuisci?tab=webcam""#));
    }
}
