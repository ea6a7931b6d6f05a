use serde::Serialize;

use crate::compliance::{Assessment, CheckField, NodeKind, RuleSet, is_okr};
use crate::hierarchy::{FolderNode, FolderTree, WorkspaceNode, WorkspaceTree};
use crate::registry::Registry;
use crate::style::{paint, red, wrong};

const RULE: &str = "============================================================";

#[derive(Debug, Clone, Serialize)]
pub struct ReportNode {
    #[serde(flatten)]
    pub assessment: Assessment,
    pub flagged: bool,
    pub children: Vec<ReportNode>,
}

impl ReportNode {
    fn new(assessment: Assessment, children: Vec<ReportNode>) -> Self {
        Self {
            flagged: assessment.is_flagged(),
            assessment,
            children,
        }
    }

    pub fn has_flag_below(&self) -> bool {
        self.children
            .iter()
            .any(|c| c.flagged || c.has_flag_below())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub title: &'static str,
    #[serde(skip)]
    empty_message: &'static str,
    pub roots: Vec<ReportNode>,
}

impl Report {
    pub fn flagged_count(&self) -> usize {
        fn count(node: &ReportNode) -> usize {
            usize::from(node.flagged) + node.children.iter().map(count).sum::<usize>()
        }
        self.roots.iter().map(count).sum()
    }

    /// Framed text report. Without `show_all` only flagged nodes and their
    /// wrong lines are printed in full; the other nodes of a branch holding a
    /// flag print their name only.
    pub fn render(&self, show_all: bool) -> String {
        let mut out = format!("\n{RULE}\n{}\n{RULE}\n\n", self.title);

        if self.roots.is_empty() {
            out.push_str(self.empty_message);
            out.push('\n');
        }
        for root in &self.roots {
            let mut lines = Vec::new();
            render_node(root, 0, show_all, false, &mut lines);
            if !lines.is_empty() {
                for line in lines {
                    out.push_str(&line);
                    out.push('\n');
                }
                out.push('\n');
            }
        }

        out.push_str(RULE);
        out.push('\n');
        out
    }
}

/// Workspace tree pruned to OKR workspaces and the ancestors leading to them.
pub fn okr_report(tree: &WorkspaceTree<'_>, registry: &Registry, current_user: &str) -> Report {
    fn build(node: &WorkspaceNode<'_>, registry: &Registry, current_user: &str) -> Option<ReportNode> {
        if !node.any(&is_okr) {
            return None;
        }
        let children = node
            .children
            .iter()
            .filter_map(|c| build(c, registry, current_user))
            .collect();
        let assessment = if is_okr(node.workspace) {
            Assessment::workspace(node.workspace, RuleSet::Okr, registry, current_user)
        } else {
            Assessment::context(node.workspace)
        };
        Some(ReportNode::new(assessment, children))
    }

    Report {
        title: "OKR WORKSPACES ACCESS REPORT",
        empty_message: "No OKR workspaces found.",
        roots: tree
            .roots
            .iter()
            .filter_map(|r| build(r, registry, current_user))
            .collect(),
    }
}

/// Folder tree with product-management workspaces; OKR workspaces are left out.
pub fn prodmgt_report(tree: &FolderTree<'_>, registry: &Registry, current_user: &str) -> Report {
    fn build(folder: &FolderNode<'_>, registry: &Registry, current_user: &str) -> ReportNode {
        let workspaces = folder
            .workspaces
            .iter()
            .filter(|w| !is_okr(w))
            .map(|w| {
                ReportNode::new(
                    Assessment::workspace(w, RuleSet::ProdMgt, registry, current_user),
                    Vec::new(),
                )
            });
        let sub_folders = folder
            .children
            .iter()
            .map(|f| build(f, registry, current_user));

        ReportNode::new(
            Assessment::folder(folder, registry, current_user),
            workspaces.chain(sub_folders).collect(),
        )
    }

    let folders = tree.folders.iter().map(|f| build(f, registry, current_user));
    let unfiled = tree.unfiled.iter().filter(|w| !is_okr(w)).map(|w| {
        ReportNode::new(
            Assessment::workspace(w, RuleSet::ProdMgt, registry, current_user),
            Vec::new(),
        )
    });

    Report {
        title: "PRODUCT MANAGEMENT WORKSPACES ACCESS REPORT",
        empty_message: "No Product Management workspaces or folders found.",
        roots: folders.chain(unfiled).collect(),
    }
}

fn indent(depth: usize) -> String {
    "..".repeat(depth)
}

/// `context` is set below a flagged node or on the path to one; such nodes
/// print their name even when clean.
fn render_node(
    node: &ReportNode,
    depth: usize,
    show_all: bool,
    context: bool,
    out: &mut Vec<String>,
) {
    let flag_below = node.has_flag_below();
    if show_all || node.flagged {
        out.push(name_line(node, depth));
        detail_lines(&node.assessment, depth, show_all, out);
    } else if context || flag_below {
        out.push(name_line(node, depth));
    } else {
        return;
    }

    let context = context || node.flagged || flag_below;
    for child in &node.children {
        render_node(child, depth + 1, show_all, context, out);
    }
}

fn name_line(node: &ReportNode, depth: usize) -> String {
    let a = &node.assessment;
    let text = match a.kind {
        NodeKind::Folder => format!("{}📁 {}", indent(depth), a.name),
        NodeKind::Workspace | NodeKind::Context => format!("{}{}", indent(depth), a.name),
    };
    if node.flagged {
        wrong(&text, a.tint)
    } else {
        paint(&text, a.tint)
    }
}

fn detail_lines(a: &Assessment, depth: usize, show_all: bool, out: &mut Vec<String>) {
    let detail = indent(depth + 1);
    let sub = indent(depth + 2);

    for check in &a.checks {
        let text = format!("{detail}{}: {}", check.field.label(), check.value);
        if check.wrong && check.field == CheckField::Color {
            out.push(red(&format!("{text} (Wrong)")));
        } else if check.wrong {
            out.push(wrong(&text, a.tint));
        } else if show_all {
            out.push(paint(&text, a.tint));
        }
    }

    if !a.users.is_empty() {
        out.push(paint(&format!("{detail}Users:"), a.tint));
        for user in &a.users {
            let text = format!("{sub}{}: {}", user.name, user.permission.label());
            out.push(if user.wrong {
                wrong(&text, a.tint)
            } else {
                paint(&text, a.tint)
            });
        }
    }

    let shown: Vec<_> = a
        .groups
        .iter()
        .filter(|g| show_all || g.wrong)
        .collect();
    if !shown.is_empty() {
        out.push(paint(&format!("{detail}Groups:"), a.tint));
        for group in shown {
            let text = format!("{sub}{}: {}", group.name, group.permission.label());
            out.push(if group.wrong {
                wrong(&text, a.tint)
            } else {
                paint(&text, a.tint)
            });
        }
    }
}
