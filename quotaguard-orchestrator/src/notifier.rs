use quotaguard_common::{NoticeAction, NoticeEntry};
use quotaguard_providers::NotificationChannel;

pub const BANNER: &str = "-------------------------------------------------\n\
InstanceId  Name  TrafficUsed   Bandwidth Ratio\n\
-------------------------------------------------\n";

/// One rendered notification, focused on a single action type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub action: NoticeAction,
    pub text: String,
}

/// `instance_id instance_name usedG totalT ratio`, the ratio being a bare percentage figure
/// under the banner's `Ratio` column.
pub fn render_line(n: &NoticeEntry) -> String {
    format!(
        "{} {} {:.1}G {:.1}T {:.2}",
        n.instance_id, n.instance_name, n.used_gb, n.total_tb, n.ratio_percent
    )
}

fn title(action: NoticeAction, count: usize, context: &str) -> String {
    match action {
        NoticeAction::Stop => format!(
            "🛑 Stopped {} instance(s) over traffic quota [{}]",
            count, context
        ),
        NoticeAction::Start => format!(
            "✅ Started {} instance(s) back under traffic quota [{}]",
            count, context
        ),
    }
}

fn render(action: NoticeAction, entries: &[&NoticeEntry], context: &str) -> String {
    let mut text = title(action, entries.len(), context);
    text.push('\n');
    text.push_str(BANNER);
    for n in entries {
        text.push_str(&render_line(n));
        text.push('\n');
    }
    text
}

/// Splits notices into a STOP message and a START message, keeping relative order.
/// Groups with no entries produce no message.
pub fn compose(notices: &[NoticeEntry], context: &str) -> Vec<Message> {
    let mut messages = Vec::with_capacity(2);
    for action in [NoticeAction::Stop, NoticeAction::Start] {
        let group: Vec<&NoticeEntry> = notices.iter().filter(|n| n.action == action).collect();
        if group.is_empty() {
            tracing::info!(
                "No instance need to {} [{}]",
                action.as_str().to_lowercase(),
                context
            );
            continue;
        }
        messages.push(Message {
            action,
            text: render(action, &group, context),
        });
    }
    messages
}

/// Sends each message on its own. Returns how many were delivered.
pub async fn notify(channel: &dyn NotificationChannel, messages: &[Message]) -> anyhow::Result<usize> {
    for m in messages {
        channel.send(&m.text).await?;
        tracing::debug!("sent {} notification via {}", m.action, channel.code());
    }
    Ok(messages.len())
}
