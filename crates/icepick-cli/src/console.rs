//! Terminal output for acquisition events and patch reports.

use crossterm::style::Stylize;
use icepick_core::patch::PatchReport;
use icepick_core::{InjectionEvent, InjectionObserver, Mod};

/// Prints acquisition progress for a person watching the terminal.
pub struct ConsoleObserver;

impl InjectionObserver for ConsoleObserver {
    fn on_event(&self, event: &InjectionEvent) {
        match event {
            InjectionEvent::InjectionException(message) => {
                eprintln!("{} {}", "warning:".yellow().bold(), message)
            }
            InjectionEvent::InjectionComplete => println!("{}", event.to_string().green()),
            other => println!("{}...", other),
        }
    }

    fn on_alert(&self, title: &str, message: &str) {
        eprintln!();
        eprintln!("{}", title.red().bold());
        eprintln!("  {}", message);
    }
}

/// One line per file plus a summary for a mod's patch run.
pub fn format_report(module: &Mod, report: &PatchReport) -> Vec<String> {
    let mut lines = vec![format!("{} {}", module.name(), module)];
    for result in &report.results {
        match &result.error {
            None => lines.push(format!("  ok    {}", result.replacement_file.display())),
            Some(error) => lines.push(format!(
                "  FAIL  {}: {}",
                result.replacement_file.display(),
                error
            )),
        }
    }
    lines.push(format!(
        "  {}/{} files patched",
        report.succeeded(),
        report.results.len()
    ));
    lines
}

pub fn print_report(module: &Mod, report: &PatchReport) {
    for line in format_report(module, report) {
        if line.starts_with("  FAIL") {
            println!("{}", line.red());
        } else {
            println!("{}", line);
        }
    }
}
