// src/utils/log.rs

//! Run-report formatting on top of the `log` facade.

const BORDER_WIDTH: usize = 60;

/// Log a header
pub fn header(title: &str) {
    let border = "═".repeat(BORDER_WIDTH);
    ::log::info!("{border}");
    ::log::info!("  {title}");
    ::log::info!("{border}");
}

/// Log a separator line
pub fn separator() {
    ::log::info!("{}", "─".repeat(BORDER_WIDTH));
}

/// Log a sub-item (indented)
pub fn sub_item(message: &str) {
    ::log::info!("    {message}");
}

/// Log a summary section
pub fn summary(title: &str, items: &[(&str, String)]) {
    ::log::info!("[SUMMARY] {title}");
    for (key, value) in items {
        ::log::info!("    {key}: {value}");
    }
}
