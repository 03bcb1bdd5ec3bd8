//! Action plans: which steps each host runs for an operation

use hmc_types::{ActionKind, Cluster, Host, HostAction, LifecycleOptions, OpKind, TransactionDraft};

/// Decides the ordered steps a host runs for a lifecycle operation.
///
/// Returning an empty plan leaves the host out of the transaction.
pub trait ActionPlanPolicy: Send + Sync {
    fn plan(&self, host: &Host, op: OpKind, options: LifecycleOptions) -> Vec<HostAction>;
}

/// One step for the operation itself over all of the host's roles; an
/// uninstall with `wipeout` also purges data once the software is gone.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultPlanPolicy;

impl ActionPlanPolicy for DefaultPlanPolicy {
    fn plan(&self, host: &Host, op: OpKind, options: LifecycleOptions) -> Vec<HostAction> {
        let mut steps = vec![HostAction::new(ActionKind::from(op), host.roles.clone())];
        if op == OpKind::Uninstall && options.wipeout {
            steps.push(HostAction::new(ActionKind::PurgeData, host.roles.clone()));
        }
        steps
    }
}

/// Build the transaction draft for `op` over the cluster's hosts
#[must_use]
pub fn build_draft(
    policy: &dyn ActionPlanPolicy,
    cluster: &Cluster,
    op: OpKind,
    options: LifecycleOptions,
) -> TransactionDraft {
    cluster
        .hosts
        .iter()
        .fold(TransactionDraft::new(&cluster.name, op, options), |draft, host| {
            let steps = policy.plan(host, op, options);
            if steps.is_empty() {
                draft
            } else {
                draft.with_task(&host.name, steps)
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cluster() -> Cluster {
        Cluster::new(
            "c1",
            vec![
                Host::new("h1", ["NAMENODE"]),
                Host::new("h2", ["DATANODE", "NODEMANAGER"]),
            ],
        )
    }

    #[test]
    fn wipeout_appends_purge_step() {
        let draft = build_draft(
            &DefaultPlanPolicy,
            &cluster(),
            OpKind::Uninstall,
            LifecycleOptions::wipeout(true),
        );
        assert_eq!(draft.tasks.len(), 2);
        let kinds: Vec<_> = draft.tasks[1].plan.iter().map(|a| a.kind).collect();
        assert_eq!(kinds, vec![ActionKind::Uninstall, ActionKind::PurgeData]);
        assert_eq!(draft.tasks[1].plan[1].roles, vec!["DATANODE", "NODEMANAGER"]);
    }

    #[test]
    fn plain_operations_have_one_step() {
        for op in [OpKind::Install, OpKind::Uninstall, OpKind::Upgrade, OpKind::Reconfigure] {
            let draft = build_draft(&DefaultPlanPolicy, &cluster(), op, LifecycleOptions::default());
            assert!(draft.tasks.iter().all(|t| t.plan.len() == 1));
            assert_eq!(draft.tasks[0].plan[0].kind, ActionKind::from(op));
        }
    }

    #[test]
    fn hosts_with_empty_plans_are_skipped() {
        struct MastersOnly;
        impl ActionPlanPolicy for MastersOnly {
            fn plan(&self, host: &Host, op: OpKind, _: LifecycleOptions) -> Vec<HostAction> {
                if host.roles.iter().any(|r| r == "NAMENODE") {
                    vec![HostAction::new(ActionKind::from(op), host.roles.clone())]
                } else {
                    Vec::new()
                }
            }
        }

        let draft = build_draft(&MastersOnly, &cluster(), OpKind::Upgrade, LifecycleOptions::default());
        assert_eq!(draft.tasks.len(), 1);
        assert_eq!(draft.tasks[0].host, "h1");
    }
}
