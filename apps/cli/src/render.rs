//! Terminal lines for session changes and the provider table.

use client_core::{HealthColor, ProviderStatus, SessionChange, SessionEvent};
use shared::{domain::Layer, error::FailureOrigin};

pub fn change_line(change: &SessionChange) -> Option<String> {
    let line = match change {
        SessionChange::Started => "generation started".to_string(),
        SessionChange::Logged(event) => event_line(event),
        SessionChange::Progress(progress) => format!(
            "[{:>3}%] case {}/{}: {}",
            progress.percent(),
            progress.current,
            progress.total,
            progress.name
        ),
        SessionChange::CaseAdded { index, name } => format!("  + {index}. {name}"),
        SessionChange::Finished { cases } => format!("done: {cases} cases"),
        SessionChange::ExportReady => "export ready".to_string(),
        SessionChange::Failed { origin, message } => failure_line(*origin, message),
        SessionChange::Reset => return None,
    };
    Some(line)
}

fn event_line(event: &SessionEvent) -> String {
    match event {
        SessionEvent::LayerStart { layer, name } => {
            format!("layer {layer} {}: started", layer_name(*layer, name.as_deref()))
        }
        SessionEvent::LayerDone {
            layer,
            elapsed,
            count,
        } => {
            let mut line = format!("layer {layer} {}: done in {elapsed:.1}s", layer.label());
            if let Some(count) = count {
                line.push_str(&format!(" ({count} cases)"));
            }
            line
        }
        SessionEvent::Error { origin, message } => failure_line(*origin, message),
    }
}

fn layer_name(layer: Layer, name: Option<&str>) -> &str {
    match name {
        Some(name) if !name.trim().is_empty() => name,
        _ => layer.label(),
    }
}

fn failure_line(origin: FailureOrigin, message: &str) -> String {
    let origin = match origin {
        FailureOrigin::Connection => "connection",
        FailureOrigin::Service => "service",
    };
    format!("error ({origin}): {message}")
}

pub fn providers_table(providers: &[ProviderStatus]) -> String {
    let width = providers
        .iter()
        .map(|provider| provider.name.chars().count())
        .max()
        .unwrap_or(0);
    providers
        .iter()
        .map(|provider| {
            let health = match provider.status {
                HealthColor::Green => "ok",
                HealthColor::Yellow => "degraded",
                HealthColor::Red => "down",
            };
            let line = format!("{:<width$}  {:<8}  {}", provider.name, health, provider.id);
            if provider.message.is_empty() {
                line
            } else {
                format!("{line}  {}", provider.message)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn export_file_name(stamp: &str, extension: &str) -> String {
    format!("test_cases_{stamp}.{extension}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::domain::Progress;

    #[test]
    fn layer_lines_fall_back_to_catalogue_names() {
        let named = SessionChange::Logged(SessionEvent::LayerStart {
            layer: Layer(1),
            name: Some("QA doc draft".to_string()),
        });
        let unnamed = SessionChange::Logged(SessionEvent::LayerStart {
            layer: Layer::CASE_LIST,
            name: None,
        });

        assert_eq!(change_line(&named).as_deref(), Some("layer 1 QA doc draft: started"));
        assert_eq!(change_line(&unnamed).as_deref(), Some("layer 2 Case list: started"));
    }

    #[test]
    fn layer_done_mentions_count_only_when_sent() {
        let with_count = SessionChange::Logged(SessionEvent::LayerDone {
            layer: Layer::CASE_LIST,
            elapsed: 20.0,
            count: Some(3),
        });
        let without = SessionChange::Logged(SessionEvent::LayerDone {
            layer: Layer::QA_DOC,
            elapsed: 12.34,
            count: None,
        });

        assert_eq!(
            change_line(&with_count).as_deref(),
            Some("layer 2 Case list: done in 20.0s (3 cases)")
        );
        assert_eq!(
            change_line(&without).as_deref(),
            Some("layer 1 QA documentation: done in 12.3s")
        );
    }

    #[test]
    fn progress_and_failures_render() {
        let progress = SessionChange::Progress(Progress {
            current: 1,
            total: 4,
            name: "Valid login".to_string(),
        });
        let failed = SessionChange::Failed {
            origin: FailureOrigin::Connection,
            message: "connection closed by server".to_string(),
        };

        assert_eq!(
            change_line(&progress).as_deref(),
            Some("[ 25%] case 1/4: Valid login")
        );
        assert_eq!(
            change_line(&failed).as_deref(),
            Some("error (connection): connection closed by server")
        );
        assert_eq!(change_line(&SessionChange::Reset), None);
    }

    #[test]
    fn providers_table_aligns_names() {
        let providers = vec![
            ProviderStatus {
                id: "gigachat".to_string(),
                name: "GigaChat".to_string(),
                status: HealthColor::Green,
                message: String::new(),
            },
            ProviderStatus {
                id: "ollama".to_string(),
                name: "Ollama".to_string(),
                status: HealthColor::Red,
                message: "not reachable".to_string(),
            },
        ];

        assert_eq!(
            providers_table(&providers),
            "GigaChat  ok        gigachat\nOllama    down      ollama  not reachable"
        );
    }

    #[test]
    fn export_files_carry_the_stamp() {
        assert_eq!(
            export_file_name("2026-10-18_09-30", "csv"),
            "test_cases_2026-10-18_09-30.csv"
        );
    }
}
