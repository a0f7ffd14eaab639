use crate::domain::model::AnswerSet;

pub const UPLOAD_FORM: &str = r#"<h2>Test Data Analyst Agent</h2>
<form action="/api/" method="post" enctype="multipart/form-data">
    <label>Select questions.txt:</label><br>
    <input type="file" name="questions.txt" required><br><br>
    <input type="submit" value="Submit Task">
</form>
"#;

/// Programmatic clients (anything identifying as curl) get JSON instead of HTML.
pub fn is_curl_like(user_agent: Option<&str>) -> bool {
    user_agent.is_some_and(|ua| ua.to_ascii_lowercase().contains("curl"))
}

pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Shortest decimal form, keeping a trailing `.0` on whole numbers.
pub fn format_correlation(r: f64) -> String {
    if r.fract() == 0.0 {
        format!("{:.1}", r)
    } else {
        r.to_string()
    }
}

pub fn render_html(answers: &AnswerSet) -> String {
    let correlation = answers
        .correlation
        .map_or_else(|| "N/A".to_string(), format_correlation);

    let chart = if answers.chart.is_empty() {
        "<i>No (Rank, Peak) data to plot</i>".to_string()
    } else {
        format!(
            r#"<img src="{}" width="600" alt="Rank vs Peak scatterplot">"#,
            escape_html(&answers.chart)
        )
    };

    format!(
        r#"<h2>Results</h2>
<ul>
    <li><b>1. How many $2B movies before 2000?</b> {count}</li>
    <li><b>2. Earliest film &gt; $1.5B?</b> {title}</li>
    <li><b>3. Correlation between Rank and Peak?</b> {correlation}</li>
    <li><b>4. Scatterplot:</b><br>{chart}</li>
</ul>
<br><a href="/">&#11013;&#65039; Back</a>
"#,
        count = answers.count,
        title = escape_html(&answers.earliest_title),
        correlation = correlation,
        chart = chart,
    )
}
