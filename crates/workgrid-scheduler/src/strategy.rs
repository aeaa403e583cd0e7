//! Strategy seam and the scratch state a strategy plans against.

use std::collections::{BTreeMap, HashMap, HashSet};

use workgrid_cluster::WorkloadActionsInstruction;
use workgrid_core::{
    ActionType, ClusterMember, RunningState, SchedulerAction, Workload, WorkloadReport,
    WorkloadReportEntry,
};

/// Turns inventory plus reports into phased instructions.
///
/// The returned list holds at most two maps: removals first, then
/// additions and restarts. Callers must wait for the first phase to
/// finish before submitting the second.
pub trait SchedulerStrategy: Send + Sync {
    fn schedule(
        &self,
        inventory: &HashSet<Workload>,
        reports: &HashMap<ClusterMember, WorkloadReport>,
    ) -> Vec<HashMap<ClusterMember, WorkloadActionsInstruction>>;
}

/// Working copy of every member's report plus the actions planned so far.
///
/// Members are kept ordered by urn so that every tie between equally
/// loaded members resolves the same way on every node.
#[derive(Debug, Clone, Default)]
pub struct SchedulerStrategyContext {
    mapping: BTreeMap<ClusterMember, WorkloadReport>,
    actions: BTreeMap<ClusterMember, Vec<SchedulerAction>>,
}

impl SchedulerStrategyContext {
    pub fn new(reports: &HashMap<ClusterMember, WorkloadReport>) -> Self {
        Self {
            mapping: reports
                .iter()
                .map(|(member, report)| (member.clone(), report.clone()))
                .collect(),
            actions: BTreeMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.mapping.is_empty()
    }

    pub fn mapping(&self) -> &BTreeMap<ClusterMember, WorkloadReport> {
        &self.mapping
    }

    pub fn actions(&self) -> &BTreeMap<ClusterMember, Vec<SchedulerAction>> {
        &self.actions
    }

    pub fn load(&self, member: &ClusterMember) -> usize {
        self.mapping.get(member).map_or(0, WorkloadReport::len)
    }

    /// Fewest entries; the lowest urn wins a tie.
    pub fn least_busy(&self) -> Option<&ClusterMember> {
        self.mapping
            .iter()
            .min_by_key(|(_, report)| report.len())
            .map(|(member, _)| member)
    }

    /// Most entries; the lowest urn wins a tie.
    pub fn most_busy(&self) -> Option<&ClusterMember> {
        let mut best: Option<(&ClusterMember, usize)> = None;
        for (member, report) in &self.mapping {
            if best.is_none_or(|(_, load)| report.len() > load) {
                best = Some((member, report.len()));
            }
        }
        best.map(|(member, _)| member)
    }

    pub fn spread(&self) -> usize {
        let loads = self.mapping.values().map(WorkloadReport::len);
        match (loads.clone().max(), loads.min()) {
            (Some(max), Some(min)) => max - min,
            _ => 0,
        }
    }

    pub fn is_assigned(&self, workload: &Workload) -> bool {
        self.mapping.values().any(|report| report.contains(workload))
    }

    /// Members currently holding the workload, in urn order.
    pub fn holders(&self, workload: &Workload) -> Vec<ClusterMember> {
        self.mapping
            .iter()
            .filter(|(_, report)| report.contains(workload))
            .map(|(member, _)| member.clone())
            .collect()
    }

    /// Plan a start on `member`.
    pub fn add_workload(&mut self, member: &ClusterMember, workload: Workload) {
        if let Some(report) = self.mapping.get_mut(member) {
            report.push(WorkloadReportEntry::new(workload.clone(), RunningState::NotStarted));
            self.push_action(member, SchedulerAction::add(workload));
        }
    }

    /// Plan a removal from `member`. Cancels a start planned earlier in
    /// this run instead of emitting a REMOVE for it.
    pub fn remove_workload(&mut self, member: &ClusterMember, workload: &Workload) {
        let Some(report) = self.mapping.get_mut(member) else {
            return;
        };
        if report.remove_workload(workload) == 0 {
            return;
        }

        let actions = self.actions.entry(member.clone()).or_default();
        let before = actions.len();
        actions.retain(|a| !(a.action == ActionType::Add && &a.workload == workload));
        if actions.len() == before {
            actions.push(SchedulerAction::remove(workload.clone()));
        }
    }

    /// Plan a restart in place.
    pub fn restart_workload(&mut self, member: &ClusterMember, workload: &Workload) {
        if self.mapping.get(member).is_some_and(|r| r.contains(workload)) {
            self.push_action(member, SchedulerAction::restart(workload.clone()));
        }
    }

    fn push_action(&mut self, member: &ClusterMember, action: SchedulerAction) {
        self.actions.entry(member.clone()).or_default().push(action);
    }

    /// Split the planned actions into a removal phase and an
    /// addition/restart phase, omitting empty phases and idle members.
    pub fn into_instructions(self) -> Vec<HashMap<ClusterMember, WorkloadActionsInstruction>> {
        let mut removals = HashMap::new();
        let mut others = HashMap::new();

        for (member, actions) in self.actions {
            let (remove, rest): (Vec<_>, Vec<_>) =
                actions.into_iter().partition(|a| a.action.is_removal());
            if !remove.is_empty() {
                removals.insert(member.clone(), WorkloadActionsInstruction::new(remove));
            }
            if !rest.is_empty() {
                others.insert(member, WorkloadActionsInstruction::new(rest));
            }
        }

        [removals, others]
            .into_iter()
            .filter(|phase| !phase.is_empty())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(id: &str) -> ClusterMember {
        ClusterMember::new("local", id)
    }

    fn report(ids: &[&str]) -> WorkloadReport {
        ids.iter()
            .map(|id| WorkloadReportEntry::new(Workload::new("ticker", *id), RunningState::Running))
            .collect()
    }

    fn context(reports: Vec<(&str, Vec<&str>)>) -> SchedulerStrategyContext {
        let reports: HashMap<_, _> = reports
            .into_iter()
            .map(|(m, ids)| (member(m), report(&ids)))
            .collect();
        SchedulerStrategyContext::new(&reports)
    }

    #[test]
    fn busy_and_idle_ties_break_by_urn() {
        let ctx = context(vec![("b", vec!["x"]), ("a", vec!["y"]), ("c", vec![])]);
        assert_eq!(ctx.least_busy(), Some(&member("c")));
        assert_eq!(ctx.most_busy(), Some(&member("a")));
        assert_eq!(ctx.spread(), 1);
    }

    #[test]
    fn copy_leaves_original_reports_untouched() {
        let reports: HashMap<_, _> = [(member("a"), report(&["x"]))].into_iter().collect();
        let mut ctx = SchedulerStrategyContext::new(&reports);
        ctx.remove_workload(&member("a"), &Workload::new("ticker", "x"));
        assert_eq!(ctx.load(&member("a")), 0);
        assert_eq!(reports[&member("a")].len(), 1);
    }

    #[test]
    fn remove_after_add_cancels_both() {
        let mut ctx = context(vec![("a", vec![])]);
        let w = Workload::new("ticker", "n");
        ctx.add_workload(&member("a"), w.clone());
        ctx.remove_workload(&member("a"), &w);

        assert_eq!(ctx.load(&member("a")), 0);
        assert!(ctx.into_instructions().is_empty());
    }

    #[test]
    fn instructions_are_phased_removals_first() {
        let mut ctx = context(vec![("a", vec!["x"]), ("b", vec![])]);
        let x = Workload::new("ticker", "x");
        ctx.remove_workload(&member("a"), &x);
        ctx.add_workload(&member("b"), x.clone());

        let phases = ctx.into_instructions();
        assert_eq!(phases.len(), 2);
        assert_eq!(phases[0][&member("a")].actions, vec![SchedulerAction::remove(x.clone())]);
        assert!(!phases[0].contains_key(&member("b")));
        assert_eq!(phases[1][&member("b")].actions, vec![SchedulerAction::add(x)]);
    }

    #[test]
    fn restart_only_applies_to_held_workloads() {
        let mut ctx = context(vec![("a", vec!["x"])]);
        ctx.restart_workload(&member("a"), &Workload::new("ticker", "other"));
        assert!(ctx.actions().is_empty());

        ctx.restart_workload(&member("a"), &Workload::new("ticker", "x"));
        assert_eq!(ctx.actions()[&member("a")].len(), 1);
    }
}
