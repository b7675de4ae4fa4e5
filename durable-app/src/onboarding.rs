//! Employee onboarding expressed as a durable workflow.
//!
//! Three phases: create the employee record, provision laptop and access
//! in parallel under a `provision` scope, then send the welcome email.
//! Fault points sit between the phases so a crash can be injected at any
//! boundary and the next run demonstrates replay.

use std::sync::Arc;

use async_trait::async_trait;
use durable_core::context::DurableContext;
use durable_core::workflow::Workflow;
use futures::future::try_join_all;
use tracing::info;

use crate::activities::{self, Employee, Ticket};
use crate::faults::FaultHook;

pub struct EmployeeOnboarding {
    employee_name: String,
    faults: Arc<dyn FaultHook>,
}

impl EmployeeOnboarding {
    pub fn new(employee_name: impl Into<String>, faults: Arc<dyn FaultHook>) -> Self {
        Self {
            employee_name: employee_name.into(),
            faults,
        }
    }
}

#[async_trait]
impl Workflow for EmployeeOnboarding {
    async fn run(&self, ctx: &DurableContext) -> anyhow::Result<()> {
        let employee: Employee = {
            let name = self.employee_name.clone();
            ctx.step("create-record", move || async move {
                activities::create_employee_record(&name).await
            })
            .await?
        };
        self.faults.trip("after-create-record")?;

        let provision = ctx.scoped("provision")?;
        let laptop_branch = {
            let scope = provision.clone();
            let employee_id = employee.id.clone();
            tokio::spawn(async move {
                scope
                    .step("laptop", move || async move {
                        activities::provision_laptop(&employee_id).await
                    })
                    .await
            })
        };
        let access_branch = {
            let scope = provision.clone();
            let employee_id = employee.id.clone();
            tokio::spawn(async move {
                scope
                    .step("access", move || async move {
                        activities::provision_access(&employee_id).await
                    })
                    .await
            })
        };

        let mut tickets: Vec<Ticket> = Vec::new();
        for branch in try_join_all([laptop_branch, access_branch]).await? {
            tickets.push(branch?);
        }
        self.faults.trip("after-provisioning")?;

        {
            let employee = employee.clone();
            ctx.step::<(), _, _>("welcome-email", move || async move {
                activities::send_welcome_email(&employee, &tickets).await
            })
            .await?
        };

        info!(employee = %employee.name, id = %employee.id, "onboarding complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::faults::NoFault;
    use durable_core::codec::JsonCodec;
    use durable_core::store::StepStore;
    use durable_runtime::MemoryStepStore;

    /// Returns an error at the configured point instead of killing the
    /// process.
    struct ErrAt(&'static str);

    impl FaultHook for ErrAt {
        fn trip(&self, point: &str) -> anyhow::Result<()> {
            if point == self.0 {
                anyhow::bail!("injected fault at {point}");
            }
            Ok(())
        }
    }

    fn context(store: &Arc<MemoryStepStore>, run_id: &str) -> DurableContext {
        DurableContext::root(
            "onboarding-test",
            run_id,
            Arc::clone(store) as Arc<dyn StepStore>,
            Arc::new(JsonCodec),
        )
    }

    #[tokio::test]
    async fn interrupted_onboarding_resumes_with_the_same_ids() {
        let store = Arc::new(MemoryStepStore::default());

        let interrupted = EmployeeOnboarding::new("Alice", Arc::new(ErrAt("after-provisioning")));
        let err = interrupted.run(&context(&store, "run-1")).await.unwrap_err();
        assert!(err.to_string().contains("after-provisioning"));

        let laptop_before = store
            .read("onboarding-test", "provision/laptop#0")
            .await
            .unwrap()
            .unwrap();

        let resumed = EmployeeOnboarding::new("Alice", Arc::new(NoFault));
        resumed.run(&context(&store, "run-2")).await.unwrap();

        // The replayed attempt reused the persisted ticket, not a new id.
        let laptop_after = store
            .read("onboarding-test", "provision/laptop#0")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(laptop_before.output_json, laptop_after.output_json);

        // The email step persisted an absent result.
        let email = store
            .read("onboarding-test", "welcome-email#0")
            .await
            .unwrap()
            .unwrap();
        assert!(email.output_json.is_none());
    }

    #[tokio::test]
    async fn fault_before_any_step_persists_nothing_new() {
        let store = Arc::new(MemoryStepStore::default());
        let workflow = EmployeeOnboarding::new("Alice", Arc::new(ErrAt("after-create-record")));
        workflow.run(&context(&store, "run-1")).await.unwrap_err();

        assert!(store
            .read("onboarding-test", "create-record#0")
            .await
            .unwrap()
            .is_some());
        assert!(store
            .read("onboarding-test", "provision/laptop#0")
            .await
            .unwrap()
            .is_none());
    }
}
