//! Markdown summary of a snapshot

use crate::link_quality::LinkQuality;
use crate::model::{Node, Role, UnresolvedChild};
use crate::snapshot::NetworkSnapshot;
use crate::store::{Availability, StoreView};

fn quality_text(quality: LinkQuality) -> String {
    let filled = quality.bars();
    format!(
        "LQ: [{}{}] {}",
        "█".repeat(filled),
        "░".repeat(3 - filled),
        quality.label()
    )
}

fn role_icon(role: Role) -> &'static str {
    match role {
        Role::Leader => "👑",
        Role::Router => "📡",
        Role::EndDevice => "📱",
    }
}

fn push_router(lines: &mut Vec<String>, node: &Node) {
    lines.push(format!("### {} {}", role_icon(node.role), node.display_name()));

    let mut detail = vec![node.role.label().to_string()];
    if let Some(quality) = node.link_quality {
        detail.push(quality_text(quality));
    }
    let detail = detail.join(" • ");
    match node.manufacturer() {
        Some(m) if !m.is_empty() => lines.push(format!("*{}* • {}", m, detail)),
        _ => lines.push(detail),
    }
    lines.push(String::new());
}

fn push_child(lines: &mut Vec<String>, child: &Node) {
    let icon = if child.sleepy { "💤" } else { "📱" };
    match &child.identity {
        Some(identity) => {
            lines.push(format!("   └─ {} **{}**", icon, identity.name));
            let manufacturer = identity.manufacturer.as_deref().unwrap_or("");
            let model = identity.model.as_deref().unwrap_or("");
            if !manufacturer.is_empty() || !model.is_empty() {
                lines.push(format!("       *{}* {}", manufacturer, model).trim_end().to_string());
            }
        }
        None => {
            let kind = if child.sleepy { "Sleepy End Device" } else { "End Device" };
            match child.rloc16 {
                Some(rloc) => lines.push(format!("   └─ {} {} ({:#06x})", icon, kind, rloc)),
                None => lines.push(format!("   └─ {} {} ({})", icon, kind, child.ext_address)),
            }
        }
    }
    lines.push(String::new());
}

fn push_unresolved(lines: &mut Vec<String>, child: &UnresolvedChild) {
    let (icon, kind) = if child.sleepy {
        ("💤", "Sleepy End Device")
    } else {
        ("📱", "End Device")
    };
    let id = match (child.rloc16, child.child_id) {
        (Some(rloc), _) => format!("{:#06x}", rloc),
        (None, Some(id)) => format!("child {}", id),
        (None, None) => "unknown".to_string(),
    };
    lines.push(format!("   └─ {} {} ({})", icon, kind, id));
    lines.push(String::new());
}

/// Render a snapshot: leader first, then each router in discovery order
/// followed by its end-device children, then the WiFi devices.
pub fn render(snapshot: &NetworkSnapshot) -> String {
    let mut lines = Vec::new();
    let name = snapshot.network_name.as_deref().unwrap_or("Unknown");
    let total = snapshot.nodes.len() + snapshot.counts.unresolved_children;

    lines.push(format!("## 🧵 Thread Network: {}", name));
    lines.push(String::new());
    lines.push(format!(
        "**Routers:** {} | **Thread Devices:** {}",
        snapshot.counts.routers, total
    ));
    let thread = snapshot.partition.thread.len();
    let wifi = snapshot.partition.wifi.len();
    if thread > 0 || wifi > 0 {
        lines.push(format!("**Registry:** {} Thread + {} WiFi", thread, wifi));
    }
    lines.push(String::new());
    lines.push("---".to_string());
    lines.push(String::new());

    let routers = snapshot
        .leader_node()
        .into_iter()
        .chain(snapshot.nodes.iter().filter(|n| n.role == Role::Router));
    for router in routers {
        push_router(&mut lines, router);
        for child in snapshot
            .children_of(&router.ext_address)
            .filter(|c| c.role == Role::EndDevice)
        {
            push_child(&mut lines, child);
        }
        for unresolved in &router.unresolved_children {
            push_unresolved(&mut lines, unresolved);
        }
    }

    // Children of end devices are not reached by the loop above
    let listed = |n: &Node| {
        snapshot
            .parent_link(&n.ext_address)
            .and_then(|l| snapshot.node(&l.source))
            .is_some_and(|p| p.role.is_router_capable())
    };
    let stray: Vec<&Node> = snapshot
        .nodes
        .iter()
        .filter(|n| n.role == Role::EndDevice && !listed(n))
        .collect();
    if !stray.is_empty() {
        lines.push("### Other devices".to_string());
        lines.push(String::new());
        for child in stray {
            push_child(&mut lines, child);
        }
    }

    if !snapshot.partition.wifi.is_empty() {
        lines.push("---".to_string());
        lines.push(String::new());
        lines.push("### 📶 WiFi devices".to_string());
        for device in &snapshot.partition.wifi {
            lines.push(format!(
                "- **{}** ({})",
                device.name,
                device.manufacturer.as_deref().unwrap_or("")
            ));
        }
        lines.push(String::new());
    }

    lines.join("\n")
}

/// Render a store view, flagging staleness
pub fn render_view(view: &StoreView) -> String {
    let Some(snapshot) = &view.snapshot else {
        let mut text = "## 🧵 Thread Network\n\n*No topology available yet.*\n".to_string();
        if let Some(failure) = &view.health.last_failure {
            text.push_str(&format!("\n> Last poll failed: {}\n", failure.message));
        }
        return text;
    };

    let mut text = render(snapshot);
    if matches!(
        view.health.availability,
        Availability::Stale | Availability::Degraded
    ) {
        let since = view
            .health
            .stale_since_cycle
            .map(|c| format!(" since cycle {}", c))
            .unwrap_or_default();
        let reason = view
            .health
            .last_failure
            .as_ref()
            .map(|f| format!(": {}", f.message))
            .unwrap_or_default();
        text = format!("> ⚠️ Topology is stale{}{}\n\n{}", since, reason, text);
    }
    text
}
