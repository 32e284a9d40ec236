use std::fmt::Write;

use crate::jobs::{JobStatus, JobSummary};

const INDEX_TEMPLATE: &str = include_str!("index.html");
const LIST_TEMPLATE: &str = include_str!("list.html");
const PLACEHOLDER: &str = "%MESSAGE%";

/// Banner text is reduced to `[A-Za-z0-9 ]` before it is shown or put in a
/// redirect, so it needs no further escaping.
pub fn sanitize_message(message: &str) -> String {
    message
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == ' ')
        .collect()
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

pub fn render_home(message: Option<&str>) -> String {
    let banner = match message {
        Some(m) => format!(
            "<div class=\"alert\">{}</div><br />",
            sanitize_message(m)
        ),
        None => String::new(),
    };
    INDEX_TEMPLATE.replace(PLACEHOLDER, &banner)
}

pub fn render_job(name: &str, log: &str, status: Option<JobStatus>) -> String {
    let mut body = format!(
        "<h2>{}</h2>\n\n<pre class=\"log\">\n{}</pre>\n",
        name,
        escape_html(log)
    );
    match status {
        Some(JobStatus::Succeeded) => {
            body.push_str("<div class=\"alert success\">Job completed successfully</div><br />")
        }
        Some(JobStatus::Failed) => {
            body.push_str("<div class=\"alert\">Job completed with errors</div><br />")
        }
        Some(JobStatus::Running) | None => {
            body.push_str("<button onclick=\"window.location.reload();\">Refresh</button>")
        }
    }
    let _ = write!(
        body,
        "\n<p><a href=\"/ini?job={}\">Original config file</a></p>\n",
        name
    );
    LIST_TEMPLATE.replace(PLACEHOLDER, &body)
}

pub fn render_job_list(jobs: &[JobSummary]) -> String {
    let mut body = String::from("<h2>All jobs</h2>\n<ul>\n");
    if jobs.is_empty() {
        body.push_str("<li>No jobs yet</li>\n");
    }
    for job in jobs {
        let note = match job.status {
            JobStatus::Running => " (running)",
            JobStatus::Succeeded => " (succeeded)",
            JobStatus::Failed => " (completed with errors)",
        };
        let _ = writeln!(
            body,
            "<li><a href=\"/view?job={name}\">{name}</a>{note}</li>",
            name = job.name,
            note = note
        );
    }
    body.push_str("</ul>\n");
    LIST_TEMPLATE.replace(PLACEHOLDER, &body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_is_sanitized() {
        assert_eq!(sanitize_message("<b>hi</b> there!"), "bhib there");
        let page = render_home(Some("<script>x</script>"));
        assert!(page.contains("scriptxscript"));
        assert!(!page.contains("<script>"));
    }

    #[test]
    fn home_without_message_has_no_placeholder() {
        let page = render_home(None);
        assert!(!page.contains(PLACEHOLDER));
        assert!(page.contains("name=\"inifile\""));
    }

    #[test]
    fn job_log_is_escaped() {
        let page = render_job("j1", "<oops> & done", Some(JobStatus::Running));
        assert!(page.contains("&lt;oops&gt; &amp; done"));
        assert!(page.contains("Refresh"));
    }

    #[test]
    fn job_banner_follows_status() {
        assert!(render_job("j", "", Some(JobStatus::Succeeded)).contains("completed successfully"));
        assert!(render_job("j", "", Some(JobStatus::Failed)).contains("completed with errors"));
    }
}
