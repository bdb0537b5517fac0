use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyModifiers};
use icepick_core::CancelSignal;
use tracing::debug;

/// Spawn a thread that cancels `cancel` when Esc, q or Ctrl+C is pressed.
///
/// The thread exits on its own once the signal is triggered from anywhere.
pub fn spawn_keyboard_monitor(cancel: Arc<CancelSignal>) -> JoinHandle<()> {
    thread::spawn(move || {
        debug!("Keyboard monitor started");

        while !cancel.is_cancelled() {
            // Poll with a timeout so a cancel from elsewhere is noticed
            if event::poll(Duration::from_millis(100)).unwrap_or(false)
                && let Ok(Event::Key(key_event)) = event::read()
                && should_cancel(&key_event)
            {
                debug!("Cancel key pressed: {:?}", key_event.code);
                cancel.trigger();
                break;
            }
        }

        debug!("Keyboard monitor stopped");
    })
}

/// Install the Ctrl+C handler and keyboard monitor for one command.
pub fn cancel_on_interrupt() -> anyhow::Result<Arc<CancelSignal>> {
    let cancel = Arc::new(CancelSignal::new());
    let cancel_ctrlc = Arc::clone(&cancel);
    ctrlc::set_handler(move || {
        tracing::info!("Received interrupt, cancelling...");
        cancel_ctrlc.trigger();
    })?;
    spawn_keyboard_monitor(Arc::clone(&cancel));
    Ok(cancel)
}

fn should_cancel(event: &KeyEvent) -> bool {
    match event.code {
        KeyCode::Esc => true,
        KeyCode::Char('q') | KeyCode::Char('Q') => true,
        KeyCode::Char('c') if event.modifiers.contains(KeyModifiers::CONTROL) => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_keys() {
        for event in [
            KeyEvent::new(KeyCode::Esc, KeyModifiers::NONE),
            KeyEvent::new(KeyCode::Char('q'), KeyModifiers::NONE),
            KeyEvent::new(KeyCode::Char('Q'), KeyModifiers::SHIFT),
            KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL),
        ] {
            assert!(should_cancel(&event), "{:?}", event);
        }
    }

    #[test]
    fn test_other_keys_ignored() {
        for event in [
            KeyEvent::new(KeyCode::Char('a'), KeyModifiers::NONE),
            KeyEvent::new(KeyCode::Enter, KeyModifiers::NONE),
            KeyEvent::new(KeyCode::Char('c'), KeyModifiers::NONE),
        ] {
            assert!(!should_cancel(&event), "{:?}", event);
        }
    }
}
