use iocraft::prelude::*;
use tokio::sync::watch;

use mput::{RegistrationStatus, UploadReport};

const BAR_WIDTH: usize = 40;

#[derive(Default, Props)]
pub struct ProgressBarProps {
    pub title: String,
    pub progress: Option<watch::Receiver<f32>>,
}

#[component]
pub fn ProgressBar(props: &ProgressBarProps, mut hooks: Hooks) -> impl Into<AnyElement<'static>> {
    let mut percent = hooks.use_state(|| 0.0f32);
    let receiver = props.progress.clone();

    hooks.use_future(async move {
        let Some(mut receiver) = receiver else {
            return;
        };
        while receiver.changed().await.is_ok() {
            let value = *receiver.borrow_and_update();
            percent.set(value);
        }
    });

    let value = percent.get().clamp(0.0, 100.0);
    let filled = ((value / 100.0) * BAR_WIDTH as f32).round() as usize;
    let bar = format!("{}{}", "█".repeat(filled), "░".repeat(BAR_WIDTH - filled));

    element! {
        View(flex_direction: FlexDirection::Column) {
            Text(content: props.title.clone(), weight: Weight::Bold)
            View(flex_direction: FlexDirection::Row) {
                Text(content: bar, color: Color::Cyan)
                Text(content: format!(" {:>5.1}%", value))
            }
        }
    }
}

#[derive(Default, Props)]
pub struct MessageProps {
    pub message: String,
}

#[component]
pub fn SuccessMessage(props: &MessageProps) -> impl Into<AnyElement<'static>> {
    element! {
        View(flex_direction: FlexDirection::Row) {
            Text(content: "◆ ", color: Color::Green)
            Text(content: props.message.clone())
        }
    }
}

#[component]
pub fn ErrorMessage(props: &MessageProps) -> impl Into<AnyElement<'static>> {
    element! {
        View(flex_direction: FlexDirection::Row) {
            Text(content: "▲ ", color: Color::Red)
            Text(content: props.message.clone())
        }
    }
}

#[derive(Default, Props)]
pub struct UploadSummaryProps {
    pub upload_id: String,
    pub object_key: String,
    pub parts: u32,
    pub commit_status: u16,
    pub registration: String,
    pub registered: bool,
}

impl UploadSummaryProps {
    pub fn from_report(report: &UploadReport) -> Self {
        let (registration, registered) = match &report.registration {
            RegistrationStatus::Skipped => ("skipped".to_string(), true),
            RegistrationStatus::Registered(receipt) => {
                (format!("registered ({})", receipt.status), true)
            }
            RegistrationStatus::Failed(e) => (e.to_string(), false),
        };
        Self {
            upload_id: report.session.session_id.clone(),
            object_key: report.session.object_key.clone(),
            parts: report.session.part_count,
            commit_status: report.commit.status,
            registration,
            registered,
        }
    }
}

#[component]
pub fn UploadSummary(props: &UploadSummaryProps) -> impl Into<AnyElement<'static>> {
    let registration_color = if props.registered {
        Color::Green
    } else {
        Color::Red
    };

    element! {
        View(flex_direction: FlexDirection::Column) {
            View(flex_direction: FlexDirection::Row) {
                Text(content: "┌ ")
                View(background_color: Color::Blue) {
                    Text(content: &props.object_key, color: Color::White)
                }
            }
            Text(content: format!("│ upload id    {}", props.upload_id))
            Text(content: format!("│ parts        {}", props.parts))
            Text(content: format!("│ finalize     {}", props.commit_status))
            View(flex_direction: FlexDirection::Row) {
                Text(content: "└ registration ")
                Text(content: &props.registration, color: registration_color)
            }
        }
    }
}
