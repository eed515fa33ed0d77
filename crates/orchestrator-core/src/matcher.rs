//! Capability Matcher (spec.md §4.1): a pure predicate deciding whether a
//! worker session satisfies a job's requirements. Tie-breaking between
//! multiple eligible sessions is the Node Registry's concern, not this one.

use orchestrator_types::{JobRequirements, WorkerSession};

pub fn matches(requirements: &JobRequirements, session: &WorkerSession) -> bool {
    if !requirements.adapter.is_empty() && !session.capability.adapters.contains(&requirements.adapter) {
        return false;
    }

    let limits = &session.resource_limits;

    if session.capability.effective_cpu_cores(limits) < requirements.cpu.min_cores {
        return false;
    }

    if session.capability.effective_memory_mb(limits) < requirements.memory.min_mb {
        return false;
    }

    if let Some(gpu_req) = &requirements.gpu {
        let matching_gpus = session
            .capability
            .gpus
            .iter()
            .filter(|gpu| {
                session.capability.effective_vram_mb(gpu, limits) >= gpu_req.min_vram_mb
                    && gpu_req.requires.is_subset(&gpu.supports)
            })
            .count();
        if (matching_gpus as u32) < gpu_req.count {
            return false;
        }
    }

    session.satisfies_affinity(requirements.affinity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use orchestrator_types::*;
    use std::collections::HashSet;

    fn session(adapters: &[&str], cores: u32, mem_mb: u64) -> WorkerSession {
        WorkerSession {
            session_id: SessionId::new(),
            node_id: NodeId("n1".into()),
            capability: CapabilityRecord {
                cpu: CpuInfo { model: "x".into(), cores, threads: cores, features: vec![] },
                memory: MemoryInfo { total_mb: mem_mb, available_mb: mem_mb },
                storage: StorageInfo { total_gb: 100, available_gb: 100 },
                gpus: vec![],
                adapters: adapters.iter().map(|s| s.to_string()).collect(),
            },
            workspace_bindings: HashSet::new(),
            share_key: ShareKey("AAAAAAAA".into()),
            share_key_consumed: false,
            liveness: Liveness::Fresh,
            last_heartbeat: Utc::now(),
            current_jobs: HashSet::new(),
            resource_limits: ResourceLimits::default(),
            remote_control_enabled: false,
            registered_at: Utc::now(),
        }
    }

    fn req(adapter: &str, cores: u32, mem_mb: u64) -> JobRequirements {
        JobRequirements {
            cpu: CpuRequirement { min_cores: cores },
            memory: MemoryRequirement { min_mb: mem_mb },
            gpu: None,
            adapter: adapter.into(),
            max_cost_cents: 0,
            currency: "usd".into(),
            affinity: None,
        }
    }

    #[test]
    fn adapter_mismatch_fails() {
        let s = session(&["docker"], 4, 8192);
        let r = req("llm-inference", 1, 1);
        assert!(!matches(&r, &s));
    }

    #[test]
    fn resource_limit_caps_effective_cores() {
        let mut s = session(&["docker"], 8, 8192);
        s.resource_limits.cpu_cores = Some(2);
        let r = req("docker", 4, 1);
        assert!(!matches(&r, &s));
    }

    #[test]
    fn public_worker_satisfies_any_affinity() {
        let s = session(&["docker"], 4, 8192);
        let mut r = req("docker", 1, 1);
        r.affinity = Some(WorkspaceId::new());
        assert!(matches(&r, &s));
    }

    #[test]
    fn bound_worker_requires_matching_workspace() {
        let mut s = session(&["docker"], 4, 8192);
        let ws = WorkspaceId::new();
        s.workspace_bindings.insert(ws);
        let mut r = req("docker", 1, 1);
        r.affinity = Some(WorkspaceId::new());
        assert!(!matches(&r, &s));
        r.affinity = Some(ws);
        assert!(matches(&r, &s));
    }

    #[test]
    fn gpu_requirement_checks_count_vram_and_api() {
        let mut s = session(&["docker"], 4, 8192);
        s.capability.gpus.push(GpuInfo {
            vendor: GpuVendor::Nvidia,
            model: "a100".into(),
            vram_mb: 40000,
            supports: [ComputeApi::Cuda].into_iter().collect(),
        });
        let mut r = req("docker", 1, 1);
        r.gpu = Some(GpuRequirement {
            count: 1,
            min_vram_mb: 20000,
            requires: [ComputeApi::Cuda].into_iter().collect(),
        });
        assert!(matches(&r, &s));

        r.gpu.as_mut().unwrap().requires = [ComputeApi::Rocm].into_iter().collect();
        assert!(!matches(&r, &s));
    }
}
