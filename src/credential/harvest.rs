//! One-way extraction of leaf credentials into a repository.

use std::collections::HashMap;

use crate::tree::{RecordTree, TreeError};

use super::{CredentialRecord, CredentialRepository};

/// Walk the subtree under `node_id` (any full traversal is acceptable; the
/// per-leaf operations are independent) and move each leaf's credentials
/// into `repository`.
///
/// A leaf qualifies when its stored username or stored password is
/// non-empty. The new record is populated from the leaf's *effective*
/// username and domain but its *stored* password, since passwords of
/// ancestors were never typed on this leaf. The leaf's own
/// username/password/domain are cleared and its `credential_ref` set to the
/// new record's id. Leaves with empty credentials are skipped, not errors.
///
/// Returns a map from node id to the credential id assigned to it.
pub fn harvest(
    tree: &mut RecordTree,
    node_id: &str,
    repository: &mut CredentialRepository,
) -> Result<HashMap<String, String>, TreeError> {
    if tree.node(node_id).is_none() {
        return Err(TreeError::NodeNotFound(node_id.to_string()));
    }

    let mut subtree: Vec<String> = vec![node_id.to_string()];
    subtree.extend(tree.descendants(node_id).iter().map(|n| n.id.clone()));

    let mut assigned = HashMap::new();
    for id in subtree {
        let Some(node) = tree.node(&id) else { continue };
        if !node.is_leaf() {
            continue;
        }
        if node.properties.username.is_empty() && node.properties.password.is_empty() {
            continue;
        }

        let username = tree.effective_username(&id).unwrap_or_default();
        let domain = tree.effective_domain(&id).unwrap_or_default();
        let password = node.properties.password.clone();

        let credential_id = repository.add(CredentialRecord::new(username, password, domain));
        tracing::debug!(node = %id, credential = %credential_id, "Extracted leaf credentials");

        if let Some(props) = tree.properties_mut(&id) {
            props.credential_ref = Some(credential_id.clone());
            props.username.clear();
            props.password.clear();
            props.domain.clear();
        }
        assigned.insert(id, credential_id);
    }

    Ok(assigned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{ConnectionProperties, InheritedProperty};

    #[test]
    fn test_harvest_moves_credentials() {
        let mut tree = RecordTree::new();
        let root = tree.add_root("Connections");
        let a = tree
            .add_connection(
                &root,
                "a",
                ConnectionProperties::new("a.example")
                    .with_username("alice")
                    .with_password("pw-a")
                    .with_domain("CORP"),
            )
            .unwrap();
        for prop in [
            InheritedProperty::Username,
            InheritedProperty::Password,
            InheritedProperty::Domain,
        ] {
            tree.stop_inheriting(&a, prop).unwrap();
        }

        let mut repo = CredentialRepository::new();
        let assigned = harvest(&mut tree, &root, &mut repo).unwrap();

        assert_eq!(repo.len(), 1);
        assert_eq!(assigned.len(), 1);
        let record = repo.get(&assigned[&a]).unwrap();
        assert_eq!(record.username, "alice");
        assert_eq!(record.password, "pw-a");
        assert_eq!(record.domain, "CORP");

        let props = &tree.node(&a).unwrap().properties;
        assert!(props.username.is_empty());
        assert!(props.password.is_empty());
        assert!(props.domain.is_empty());
        assert_eq!(props.credential_ref.as_deref(), Some(assigned[&a].as_str()));
    }

    #[test]
    fn test_harvest_skips_empty_leaves() {
        let mut tree = RecordTree::new();
        let root = tree.add_root("Connections");
        tree.add_connection(&root, "bare", ConnectionProperties::new("b.example"))
            .unwrap();

        let mut repo = CredentialRepository::new();
        let assigned = harvest(&mut tree, &root, &mut repo).unwrap();
        assert!(repo.is_empty());
        assert!(assigned.is_empty());
    }

    #[test]
    fn test_harvest_uses_effective_username() {
        // Password typed on the leaf, username inherited from the folder.
        let mut tree = RecordTree::new();
        let root = tree.add_root("Connections");
        let folder = tree.add_container(&root, "F").unwrap();
        tree.properties_mut(&folder).unwrap().username = "svc-account".into();
        tree.stop_inheriting(&folder, InheritedProperty::Username).unwrap();

        let leaf = tree
            .add_connection(
                &folder,
                "c",
                ConnectionProperties::new("c.example").with_password("pw-c"),
            )
            .unwrap();

        let mut repo = CredentialRepository::new();
        let assigned = harvest(&mut tree, &root, &mut repo).unwrap();

        let record = repo.get(&assigned[&leaf]).unwrap();
        assert_eq!(record.username, "svc-account");
        assert_eq!(record.password, "pw-c");
    }

    #[test]
    fn test_repository_count_matches_qualifying_leaves() {
        let mut tree = RecordTree::new();
        let root = tree.add_root("Connections");
        let folder = tree.add_container(&root, "F").unwrap();
        for (name, user, pw) in [("a", "u1", "p1"), ("b", "", "p2"), ("c", "", "")] {
            tree.add_connection(
                &folder,
                name,
                ConnectionProperties::new(name)
                    .with_username(user)
                    .with_password(pw),
            )
            .unwrap();
        }

        let mut repo = CredentialRepository::new();
        harvest(&mut tree, &root, &mut repo).unwrap();

        // Two leaves had a non-empty username or password beforehand.
        assert_eq!(repo.len(), 2);
        for node in tree.descendants(&root) {
            assert!(node.properties.password.is_empty());
        }
    }
}
