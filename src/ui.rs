use iocraft::prelude::*;
use tokio::sync::watch;

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
        if let Some(mut receiver) = receiver {
            while receiver.changed().await.is_ok() {
                let value = *receiver.borrow();
                percent.set(value);
            }
        }
    });

    const WIDTH: usize = 40;
    let filled = (((percent.get() / 100.0) * WIDTH as f32) as usize).min(WIDTH);
    let bar = format!("{}{}", "█".repeat(filled), "░".repeat(WIDTH - filled));

    element! {
        View(flex_direction: FlexDirection::Column) {
            Text(weight: Weight::Bold, content: props.title.clone())
            View(flex_direction: FlexDirection::Row) {
                Text(content: bar)
                Text(content: format!(" {:>5.1}%", percent.get()))
            }
        }
    }
}

#[derive(Default, Props)]
pub struct StatusMessageProps {
    pub message: String,
}

#[component]
pub fn SuccessMessage(props: &StatusMessageProps) -> impl Into<AnyElement<'static>> {
    element! {
        View(flex_direction: FlexDirection::Row) {
            Text(color: Color::Green, content: "◆ ")
            Text(content: props.message.clone())
        }
    }
}

#[component]
pub fn ErrorMessage(props: &StatusMessageProps) -> impl Into<AnyElement<'static>> {
    element! {
        View(flex_direction: FlexDirection::Row) {
            Text(color: Color::Red, content: "▲ ")
            Text(content: props.message.clone())
        }
    }
}
