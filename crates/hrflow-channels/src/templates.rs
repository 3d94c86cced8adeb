//! Notification templates: built-in plain text with `{{key}}` placeholders.
//!
//! Placeholders resolve against the template context. Dotted paths walk into
//! nested objects (`{{review.deadline}}`); lists render one item per line;
//! missing keys render as an empty string.
//!
//! In HTML mode an `<id>.html` override is used when present, with every
//! substituted value escaped. Otherwise the plain text is rendered, escaped
//! as a whole, and line breaks become `<br>`.

use std::borrow::Cow;
use std::path::{Path, PathBuf};

use hrflow_core::error::{HrFlowError, Result};

/// Built-in templates keyed by template id.
const BUILTIN: &[(&str, &str)] = &[
    (
        "checkin_reminder",
        "Hello {{employee_name}},\n\nWe have not recorded your check-in for {{date}} yet.\nPlease check in as soon as you arrive.\n",
    ),
    (
        "late_checkin",
        "Hello {{employee_name}},\n\nYour check-in on {{date}} was recorded at {{check_in_time}}, after the 09:30 cut-off.\n",
    ),
    (
        "checkout_reminder",
        "Hello {{employee_name}},\n\nYou checked in at {{check_in_time}} today but no check-out has been recorded.\nPlease remember to check out before you leave.\n",
    ),
    (
        "weekly_report",
        "Hello {{manager_name}},\n\nAttendance for your team from {{week_start}} to {{week_end}} ({{total}} records):\n\n{{records}}\n",
    ),
    (
        "monthly_report",
        "Hello {{hr_name}},\n\nAttendance summary for {{month}} ({{month_start}} to {{month_end}}):\n\nTotal records: {{total}}\nPresent: {{present}}\nLate: {{late}}\nAbsent: {{absent}}\n\n{{records}}\n",
    ),
    (
        "leave_submitted",
        "Hello {{manager_name}},\n\n{{employee_name}} requested {{leave_type}} leave from {{start_date}} to {{end_date}} ({{duration}} days).\n\nReason: {{reason}}\n",
    ),
    (
        "leave_approved",
        "Hello {{employee_name}},\n\nYour {{leave_type}} leave from {{start_date}} to {{end_date}} was approved by {{approved_by}}.\n",
    ),
    (
        "leave_rejected",
        "Hello {{employee_name}},\n\nYour {{leave_type}} leave from {{start_date}} to {{end_date}} was rejected.\n\nReason: {{rejection_reason}}\n",
    ),
    (
        "leave_reminder_before",
        "Hello {{employee_name}},\n\nA reminder that your {{leave_type}} leave starts tomorrow ({{start_date}}) and ends on {{end_date}}.\n",
    ),
    (
        "leave_reminder_after",
        "Hello {{employee_name}},\n\nWelcome back from your {{leave_type}} leave!\n",
    ),
    (
        "welcome",
        "Hello {{employee_name}},\n\nWelcome to the company! Your username is {{username}}.\n{{first_day_info}}\n",
    ),
    (
        "onboarding_day_3",
        "Hello {{employee_name}},\n\nHere is your day 3 onboarding checklist:\n\n{{checklist_items}}\n",
    ),
    (
        "onboarding_day_5",
        "Hello {{employee_name}},\n\nHere is your day 5 onboarding checklist:\n\n{{checklist_items}}\n",
    ),
    (
        "onboarding_day_7",
        "Hello {{employee_name}},\n\nHere is your day 7 onboarding checklist:\n\n{{checklist_items}}\n",
    ),
    (
        "exit_process",
        "Hello {{employee_name}},\n\nYour last working day is {{last_working_day}}. Please complete the following:\n\n{{checklist_items}}\n",
    ),
    (
        "farewell",
        "Hello {{employee_name}},\n\nThank you for everything. Best wishes after {{last_working_day}}!\n",
    ),
    (
        "cycle_announcement",
        "The {{cycle_name}} performance review runs from {{start_date}} to {{end_date}}.\nSubmissions are due {{submission_deadline}}.\n",
    ),
    (
        "cycle_guidelines",
        "Guidelines for the {{cycle_name}} performance review:\n\n{{guidelines}}\n",
    ),
    (
        "cycle_self_assessment",
        "Please complete your {{cycle_name}} self-assessment by {{submission_deadline}}:\n{{self_assessment_link}}\n",
    ),
    (
        "cycle_upcoming",
        "The {{cycle_name}} performance review starts on {{start_date}}.\n",
    ),
    (
        "review_reminder_7",
        "Hello {{employee_name}},\n\nYour {{cycle_name}} self-assessment is due in 7 days ({{deadline}}).\n",
    ),
    (
        "review_reminder_3",
        "Hello {{employee_name}},\n\nYour {{cycle_name}} self-assessment is due in 3 days ({{deadline}}).\n",
    ),
    (
        "review_reminder_1",
        "Hello {{employee_name}},\n\nYour {{cycle_name}} self-assessment is due tomorrow ({{deadline}}).\n",
    ),
    (
        "review_overdue",
        "Hello {{employee_name}},\n\nYour {{cycle_name}} self-assessment was due on {{deadline}} and is now overdue.\n",
    ),
    (
        "meeting_confirmation",
        "Hello {{employee_name}},\n\nYour {{cycle_name}} review meeting with {{manager_name}} is scheduled for {{meeting_at}}.\n",
    ),
    (
        "review_summary",
        "Hello {{employee_name}},\n\nSummary of your {{cycle_name}} review:\n\n{{review_summary}}\n",
    ),
    (
        "goal_setting",
        "Hello {{employee_name}},\n\nGoals for the next review period:\n\n{{goals_next_period}}\n",
    ),
    (
        "goal_achievement",
        "Congratulations {{employee_name}}!\n\nThe goal \"{{goal_title}}\" is complete ({{progress}}%).\n",
    ),
    (
        "course_correction",
        "Hello {{employee_name}},\n\nThe goal \"{{goal_title}}\" is off track at {{progress}}%. Please agree next steps with {{manager_name}}.\n",
    ),
    (
        "quarterly_goal_reminder",
        "Hello {{employee_name}},\n\nIt is the start of {{quarter}}. Please update the progress of your {{cycle_name}} goals.\n",
    ),
    (
        "appreciation",
        "{{subject}}\n\n{{message}}\n\n— {{manager_name}}\n",
    ),
];

/// Template lookup with optional on-disk overrides.
#[derive(Debug, Clone, Default)]
pub struct Templates {
    dir: Option<PathBuf>,
    html: bool,
}

impl Templates {
    /// Built-in templates only.
    pub fn builtin() -> Self {
        Self::default()
    }

    /// Built-ins, overridden by `<dir>/<template_id>.txt` when present.
    pub fn with_dir(dir: &Path) -> Self {
        Self {
            dir: Some(dir.to_path_buf()),
            html: false,
        }
    }

    /// Render HTML bodies instead of plain text.
    pub fn html(mut self, html: bool) -> Self {
        self.html = html;
        self
    }

    /// Ids of all built-in templates.
    pub fn builtin_ids() -> impl Iterator<Item = &'static str> {
        BUILTIN.iter().map(|(id, _)| *id)
    }

    /// Template source for an id.
    pub fn source(&self, template_id: &str) -> Result<Cow<'static, str>> {
        if let Some(text) = self.read_override(template_id, "txt")? {
            return Ok(Cow::Owned(text));
        }
        BUILTIN
            .iter()
            .find(|(id, _)| *id == template_id)
            .map(|(_, text)| Cow::Borrowed(*text))
            .ok_or_else(|| HrFlowError::Render(format!("unknown template '{template_id}'")))
    }

    /// Render a template with a JSON context.
    pub fn render(&self, template_id: &str, context: &serde_json::Value) -> Result<String> {
        if !self.html {
            return render_template(&self.source(template_id)?, context);
        }
        if let Some(markup) = self.read_override(template_id, "html")? {
            return fill(&markup, context, |value| text_to_html(&value).into());
        }
        let text = render_template(&self.source(template_id)?, context)?;
        Ok(text_to_html(&text))
    }

    fn read_override(&self, template_id: &str, extension: &str) -> Result<Option<String>> {
        let Some(dir) = &self.dir else {
            return Ok(None);
        };
        let file = dir.join(format!("{template_id}.{extension}"));
        if !file.exists() {
            return Ok(None);
        }
        std::fs::read_to_string(&file)
            .map(Some)
            .map_err(|e| HrFlowError::Render(format!("read {}: {e}", file.display())))
    }
}

/// Fill `{{key}}` placeholders from `context`.
pub fn render_template(template: &str, context: &serde_json::Value) -> Result<String> {
    fill(template, context, Cow::Owned)
}

fn fill<F>(template: &str, context: &serde_json::Value, encode: F) -> Result<String>
where
    F: Fn(String) -> Cow<'static, str>,
{
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            return Err(HrFlowError::Render("unclosed placeholder".into()));
        };
        let key = after[..end].trim();
        out.push_str(&encode(lookup(context, key)));
        rest = &after[end + 2..];
    }
    out.push_str(rest);
    Ok(out)
}

/// Escape text for an HTML body, keeping its line breaks.
pub fn text_to_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + text.len() / 8);
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            '\n' => out.push_str("<br>\n"),
            c => out.push(c),
        }
    }
    out
}

fn lookup(context: &serde_json::Value, key: &str) -> String {
    let mut value = context;
    for part in key.split('.') {
        match value.get(part) {
            Some(v) => value = v,
            None => return String::new(),
        }
    }
    display(value)
}

fn display(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Bool(b) => b.to_string(),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::Array(items) => items
            .iter()
            .map(|item| format!("- {}", display(item)))
            .collect::<Vec<_>>()
            .join("\n"),
        serde_json::Value::Object(_) => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_render_placeholders() {
        let out = render_template(
            "Hi {{ name }}, due {{review.deadline}}{{missing}}.",
            &json!({"name": "Alice", "review": {"deadline": "2024-06-10"}}),
        )
        .unwrap();
        assert_eq!(out, "Hi Alice, due 2024-06-10.");
    }

    #[test]
    fn test_render_lists_and_numbers() {
        let out = render_template(
            "{{total}} items:\n{{items}}",
            &json!({"total": 2, "items": ["a", "b"]}),
        )
        .unwrap();
        assert_eq!(out, "2 items:\n- a\n- b");
    }

    #[test]
    fn test_unclosed_placeholder() {
        assert!(render_template("Hi {{name", &json!({})).is_err());
    }

    #[test]
    fn test_unknown_template() {
        let templates = Templates::builtin();
        assert!(matches!(
            templates.render("nope", &json!({})),
            Err(HrFlowError::Render(_))
        ));
    }

    #[test]
    fn test_builtin_render() {
        let templates = Templates::builtin();
        let body = templates
            .render(
                "leave_reminder_before",
                &json!({
                    "employee_name": "Bob",
                    "leave_type": "Vacation",
                    "start_date": "2024-06-11",
                    "end_date": "2024-06-14",
                }),
            )
            .unwrap();
        assert!(body.contains("Bob"));
        assert!(body.contains("starts tomorrow (2024-06-11)"));
    }

    #[test]
    fn test_directory_override() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("farewell.txt"), "Bye {{employee_name}}").unwrap();

        let templates = Templates::with_dir(dir.path());
        let body = templates
            .render("farewell", &json!({"employee_name": "Carol"}))
            .unwrap();
        assert_eq!(body, "Bye Carol");
        // Ids without an override fall back to the built-in text
        assert!(templates.source("welcome").is_ok());
    }

    #[test]
    fn test_html_mode_escapes_plain_templates() {
        let templates = Templates::builtin().html(true);
        let body = templates
            .render(
                "appreciation",
                &json!({
                    "subject": "Thanks & well done",
                    "message": "<script>alert('hi')</script>",
                    "manager_name": "Bea",
                }),
            )
            .unwrap();
        assert!(body.starts_with("Thanks &amp; well done<br>\n<br>\n"));
        assert!(body.contains("&lt;script&gt;alert(&#39;hi&#39;)&lt;/script&gt;"));
        assert!(!body.contains("<script>"));
    }

    #[test]
    fn test_html_override_escapes_values() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("review_summary.html"),
            "<p>Hi {{employee_name}}</p><div>{{review_summary}}</div>",
        )
        .unwrap();
        let context = json!({"employee_name": "Al <b>", "review_summary": "Strong\nteam \"player\""});

        let body = Templates::with_dir(dir.path()).html(true).render("review_summary", &context).unwrap();
        assert_eq!(
            body,
            "<p>Hi Al &lt;b&gt;</p><div>Strong<br>\nteam &quot;player&quot;</div>"
        );
        // Plain mode ignores the markup file
        let plain = Templates::with_dir(dir.path()).render("review_summary", &context).unwrap();
        assert!(plain.contains("Strong\nteam \"player\""));
    }
}
