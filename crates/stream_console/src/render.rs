use chrono::Local;
use stream_core::{EntityView, StreamViewModel, TargetId};

/// Prints the entity for one target whenever its line changes.
#[derive(Default)]
pub struct Renderer {
    last_line: Option<String>,
}

impl Renderer {
    pub fn render(&mut self, target: &TargetId, view: &StreamViewModel) {
        if let Some(rejected) = &view.last_rejection {
            if rejected == target {
                eprintln!("{} is already streaming", target);
            }
        }
        let Some(entity) = view.entities.iter().rev().find(|e| &e.target == target) else {
            return;
        };
        let line = format_line(entity);
        if self.last_line.as_deref() == Some(line.as_str()) {
            return;
        }
        println!("[{}] {}", Local::now().format("%H:%M:%S"), line);
        self.last_line = Some(line);
    }
}

fn format_line(entity: &EntityView) -> String {
    let mut line = format!("#{} {} ({})", entity.id, entity.target, entity.status_text());
    if !entity.summary.is_empty() {
        line.push_str(": ");
        line.push_str(&entity.summary);
    }
    if entity.can_retry {
        line.push_str(" [retry available]");
    }
    line
}
