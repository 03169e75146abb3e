//! Rendering a [`crate::log::Log`] into the three shapes external tools or
//! humans consume.

pub mod aggregate;
pub mod folded;
pub mod speedscope;

/// A sample's rendered name, shared by every exporter that needs one.
///
/// * closure: `{closure:<file>(<line>)}`
/// * free function / no function name: the bare file name
/// * method or function: `[<class>::]<function>`
pub(crate) fn render_name(frame: &crate::frame::Frame) -> String {
    if frame.closure_line != 0 {
        return format!("{{closure:{}({})}}", frame.file_name, frame.closure_line);
    }
    let Some(function_name) = &frame.function_name else {
        return frame.file_name.to_string();
    };
    match &frame.class_name {
        Some(class_name) => format!("{class_name}::{function_name}"),
        None => function_name.to_string(),
    }
}

/// Folded-stack / speedscope rendering rule: spaces and NULs become
/// underscores so chain text stays unambiguous to parse back apart on `;`.
pub(crate) fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c == ' ' || c == '\0' { '_' } else { c })
        .collect()
}
