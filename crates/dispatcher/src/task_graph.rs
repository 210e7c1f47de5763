use std::collections::HashSet;

use keeper_core::{models::TaskEntity, KeeperError, KeeperResult};
use uuid::Uuid;

/// 检查节点 id 是否在自己的后继链上再次出现
///
/// 不同分支共享同一个 id 的节点不算环。
pub fn check_cycles(root: &TaskEntity) -> KeeperResult<()> {
    fn visit<'a>(node: &'a TaskEntity, path: &mut Vec<&'a Uuid>) -> KeeperResult<()> {
        if path.contains(&&node.id) {
            return Err(KeeperError::CircularDependency { id: node.id });
        }
        path.push(&node.id);
        for child in node.children() {
            visit(child, path)?;
        }
        path.pop();
        Ok(())
    }

    visit(root, &mut Vec::new())
}

/// 按深度优先顺序收集从 `root` 可达的所有节点，包括 `root` 本身，每个 id 只出现一次
pub fn collect_nodes(root: &TaskEntity) -> Vec<&TaskEntity> {
    let mut visited = HashSet::new();
    let mut nodes = Vec::new();
    let mut stack = vec![root];

    while let Some(node) = stack.pop() {
        if !visited.insert(node.id) {
            continue;
        }
        nodes.push(node);
        // 逆序入栈，保持 success、failure、not_found 的访问顺序
        let children: Vec<_> = node.children().collect();
        stack.extend(children.into_iter().rev());
    }
    nodes
}

/// 从 `root` 可达的所有节点 id
pub fn reachable_ids(root: &TaskEntity) -> Vec<Uuid> {
    collect_nodes(root).into_iter().map(|node| node.id).collect()
}
