// Input checks run by the HTTP layer before anything reaches the store.

use crate::{
    error::{AppError, Result},
    models::*,
    query::parse_due_date,
};

pub fn course(input: &CourseInput) -> Result<()> {
    required("name", &input.name)?;
    if let Some(color) = input.color.as_deref() {
        if !is_hex_color(color) {
            return Err(AppError::validation(format!("color must be a hex colour like {DEFAULT_COURSE_COLOR}")));
        }
    }
    Ok(())
}

pub fn material(input: &MaterialInput, has_upload: bool) -> Result<()> {
    required("type", &input.kind)?;
    required("title", &input.title)?;
    match input.kind.as_str() {
        "link" if input.url.is_none() => Err(AppError::validation("a link needs a url")),
        "file" if !has_upload && input.url.is_none() => {
            Err(AppError::validation("a file material needs an uploaded file or a url"))
        }
        _ => Ok(()),
    }
}

pub fn note(title: &str) -> Result<()> {
    required("title", title)
}

pub fn assignment(title: &str, due_date: Option<&str>, status: Option<&str>) -> Result<()> {
    required("title", title)?;
    due(due_date)?;
    if let Some(status) = status {
        if !ASSIGNMENT_STATUSES.contains(&status) {
            return Err(AppError::validation(format!(
                "status must be one of {}",
                ASSIGNMENT_STATUSES.join(", ")
            )));
        }
    }
    Ok(())
}

pub fn general_item(input: &GeneralItemInput) -> Result<()> {
    required("type", &input.kind)?;
    required("title", &input.title)?;
    due(input.due_date.as_deref())
}

fn required(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(AppError::validation(format!("{field} is required")));
    }
    Ok(())
}

fn due(due_date: Option<&str>) -> Result<()> {
    match due_date {
        Some(raw) if parse_due_date(raw).is_none() => Err(AppError::validation(format!(
            "due_date {raw:?} is not a date"
        ))),
        _ => Ok(()),
    }
}

fn is_hex_color(v: &str) -> bool {
    match v.strip_prefix('#') {
        Some(hex) => matches!(hex.len(), 3 | 6) && hex.chars().all(|c| c.is_ascii_hexdigit()),
        None => false,
    }
}
