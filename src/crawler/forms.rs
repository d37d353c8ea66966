//! Canned form input policy
//!
//! Forms are filled with plausible values so that submitting them provokes
//! the POST/PUT traffic that link following alone never reaches.

use crate::browser::FormControl;

pub const PASSWORD_VALUE: &str = "Password123!";
pub const EMAIL_VALUE: &str = "test@example.com";
pub const TEXT_VALUE: &str = "testuser";

/// Picks the value to type into a control, or `None` to leave it alone
///
/// Only visible `input` and `textarea` elements are filled. A missing `type`
/// counts as `text`.
///
/// # Examples
///
/// ```
/// use surface_scout::browser::FormControl;
/// use surface_scout::crawler::canned_value;
///
/// let control = FormControl {
///     index: 0,
///     tag: "input".to_string(),
///     input_type: Some("text".to_string()),
///     name: Some("user_email".to_string()),
///     visible: true,
///     submit_like: false,
/// };
/// assert_eq!(canned_value(&control), Some("test@example.com"));
/// ```
pub fn canned_value(control: &FormControl) -> Option<&'static str> {
    if !control.visible || !matches!(control.tag.as_str(), "input" | "textarea") {
        return None;
    }

    let input_type = control.input_type.as_deref().unwrap_or("text");
    let name = control.name.as_deref().unwrap_or_default().to_lowercase();

    if input_type == "password" {
        Some(PASSWORD_VALUE)
    } else if input_type == "email" || name.contains("email") {
        Some(EMAIL_VALUE)
    } else if matches!(input_type, "text" | "search" | "url") {
        Some(TEXT_VALUE)
    } else {
        None
    }
}
