//! HTML for the form-based interface. Deliberately unstyled.

use crate::analysis::pipeline::AnalysisReport;

const TITLE: &str = "JobMatch AI - Smart Resume Matcher";

fn layout(body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>{TITLE}</title>
</head>
<body>
<h1>{TITLE}</h1>
<p>Get instant insights, match scores, and resume improvement tips</p>
{body}
</body>
</html>
"#
    )
}

fn form() -> &'static str {
    r#"<form action="/analyze" method="post" enctype="multipart/form-data">
<p><label>Upload Resume (PDF or TXT)<br>
<input type="file" name="resume" accept=".pdf,.txt,application/pdf,text/plain"></label></p>
<p><label>Paste Job Description Here<br>
<textarea name="job_description" rows="12" cols="80"></textarea></label></p>
<p><button type="submit">Analyze Resume</button></p>
</form>"#
}

pub fn render_form() -> String {
    layout(form())
}

pub fn render_warning(message: &str) -> String {
    layout(&format!(
        "<p class=\"warning\"><strong>{}</strong></p>\n{}",
        html_escape(message),
        form()
    ))
}

pub fn render_error(message: &str) -> String {
    layout(&format!(
        "<p class=\"error\"><strong>{}</strong></p>\n{}",
        html_escape(message),
        form()
    ))
}

pub fn render_report(report: &AnalysisReport) -> String {
    let feedback = html_escape(&report.result.feedback).replace('\n', "<br>\n");
    layout(&format!(
        r#"<p class="success">Analysis Complete!</p>
<h2>Match Score: {score}%</h2>
<h3>AI Feedback and Suggestions</h3>
<div class="feedback">{feedback}</div>
<p><a href="/">Analyze another resume</a></p>"#,
        score = report.result.score,
    ))
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}
