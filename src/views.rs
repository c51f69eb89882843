//! HTML pages: submission form, batch result and record list.

use std::fmt::Write;

use crate::analytics::CategoryCounts;
use crate::data::StudentRecord;

const STYLE: &str = r#"
    body { font-family: Arial, sans-serif; max-width: 960px; margin: 40px auto; padding: 20px; }
    .container { background: #f5f5f5; padding: 25px; border-radius: 10px; }
    table { width: 100%; border-collapse: collapse; margin: 15px 0; }
    th, td { padding: 8px; text-align: left; border-bottom: 1px solid #ddd; }
    th { background: #f8f9fa; }
    input { padding: 6px; border: 1px solid #ddd; border-radius: 4px; }
    button, .button { background: #007bff; color: white; padding: 10px 20px; border: none; border-radius: 4px; cursor: pointer; text-decoration: none; display: inline-block; margin: 5px 0; }
    .swatch { display: inline-block; width: 12px; height: 12px; margin-right: 6px; border: 1px solid #333; }
"#;

fn page(title: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>{title}</title>
    <style>{style}</style>
</head>
<body>
    <div class="container">
        <h1>{title}</h1>
        {body}
    </div>
</body>
</html>
"#,
        title = escape(title),
        style = STYLE,
        body = body,
    )
}

/// Minimal HTML escaping for text and attribute values.
pub fn escape(raw: &str) -> String {
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

pub fn index_page() -> String {
    let body = r#"
        <p>Enter the number of students, fill in their CIA and model exam scores, and submit to predict marks.</p>
        <form method="post" action="/predict">
            <label for="num_students">Number of students:</label>
            <input type="number" id="num_students" name="num_students" min="1" value="1" onchange="buildRows()">
            <table>
                <thead>
                    <tr><th>Student ID</th><th>Name</th><th>Subject</th><th>CIA 1</th><th>CIA 2</th><th>Model Exam</th></tr>
                </thead>
                <tbody id="rows"></tbody>
            </table>
            <button type="submit">Predict Marks</button>
        </form>
        <a class="button" href="/view">View Records</a>
        <a class="button" href="/download">Download Records</a>
        <script>
            function buildRows() {
                const count = Math.max(1, parseInt(document.getElementById('num_students').value) || 1);
                const rows = document.getElementById('rows');
                rows.innerHTML = '';
                for (let i = 0; i < count; i++) {
                    rows.innerHTML += `<tr>
                        <td><input name="student_id_${i}" required></td>
                        <td><input name="name_${i}" required></td>
                        <td><input name="subject_${i}" required></td>
                        <td><input type="number" name="cia1_${i}" required></td>
                        <td><input type="number" name="cia2_${i}" required></td>
                        <td><input type="number" name="model_exam_${i}" required></td>
                    </tr>`;
                }
            }
            buildRows();
        </script>
    "#;
    page("Student Mark Predictor", body)
}

fn record_rows(records: &[StudentRecord], with_delete: bool) -> String {
    let mut rows = String::new();
    for r in records {
        let _ = write!(
            rows,
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{:.2}</td>",
            r.id,
            escape(&r.student_id),
            escape(&r.name),
            escape(&r.subject),
            r.cia1,
            r.cia2,
            r.model_exam,
            r.predicted_mark,
        );
        if with_delete {
            let _ = write!(rows, r#"<td><a href="/delete/{}">Delete</a></td>"#, r.id);
        }
        rows.push_str("</tr>\n");
    }
    rows
}

const RECORD_HEADER: &str = "<th>ID</th><th>Student ID</th><th>Name</th><th>Subject</th><th>CIA 1</th><th>CIA 2</th><th>Model Exam</th><th>Predicted Mark</th>";

pub fn result_page(records: &[StudentRecord], counts: &CategoryCounts, chart_url: &str) -> String {
    let mut legend = String::new();
    for c in &counts.categories {
        let _ = write!(
            legend,
            r#"<li><span class="swatch" style="background: {}"></span>{}: {} ({:.1}%)</li>"#,
            c.category.css_color(),
            escape(c.label),
            c.count,
            c.percentage,
        );
    }

    let body = format!(
        r#"
        <h3>Predicted Marks</h3>
        <table>
            <thead><tr>{header}</tr></thead>
            <tbody>{rows}</tbody>
        </table>
        <h3>Performance Distribution</h3>
        <img src="{chart}" alt="Student Performance Distribution">
        <ul>{legend}</ul>
        <a class="button" href="/">New Batch</a>
        <a class="button" href="/view">View All Records</a>
        "#,
        header = RECORD_HEADER,
        rows = record_rows(records, false),
        chart = escape(chart_url),
        legend = legend,
    );
    page("Prediction Results", &body)
}

pub fn view_page(records: &[StudentRecord]) -> String {
    let table = if records.is_empty() {
        "<p>No records stored yet.</p>".to_string()
    } else {
        format!(
            r#"<table>
                <thead><tr>{header}<th></th></tr></thead>
                <tbody>{rows}</tbody>
            </table>"#,
            header = RECORD_HEADER,
            rows = record_rows(records, true),
        )
    };

    let body = format!(
        r#"
        {table}
        <a class="button" href="/">New Batch</a>
        <a class="button" href="/download">Download Records</a>
        "#,
        table = table,
    );
    page("Student Records", &body)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> StudentRecord {
        StudentRecord {
            id: 3,
            student_id: "S<3>".to_string(),
            name: "O'Neil & Co".to_string(),
            subject: "Math".to_string(),
            cia1: 10,
            cia2: 20,
            model_exam: 30,
            predicted_mark: 20.0,
        }
    }

    #[test]
    fn test_escape() {
        assert_eq!(escape(r#"<a href="x">&'"#), "&lt;a href=&quot;x&quot;&gt;&amp;&#39;");
    }

    #[test]
    fn test_view_page_escapes_and_links_delete() {
        let html = view_page(&[record()]);
        assert!(html.contains("S&lt;3&gt;"));
        assert!(html.contains("O&#39;Neil &amp; Co"));
        assert!(html.contains(r#"href="/delete/3""#));
        assert!(html.contains("20.00"));
    }

    #[test]
    fn test_result_page_shows_every_category() {
        let counts = CategoryCounts::from_marks(&[20.0]);
        let html = result_page(&[record()], &counts, "/static/performance_pie_chart.png");
        assert!(html.contains(r#"src="/static/performance_pie_chart.png""#));
        assert!(html.contains("Fail (&lt;20): 1 (100.0%)"));
        assert!(html.contains("Good (&gt;40): 0 (0.0%)"));
        assert!(!html.contains("/delete/"));
    }

    #[test]
    fn test_index_page_posts_to_predict() {
        let html = index_page();
        assert!(html.contains(r#"action="/predict""#));
        assert!(html.contains(r#"name="num_students""#));
    }
}
