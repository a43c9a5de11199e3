use rust_decimal::Decimal;

use crate::commands::{load_config, runtime, CommandResult};
use closeflow_core::{
    ActionInput, Decision, ListFilter, StepRegistry, SubmitInput, WorkflowEngine, WorkflowError,
};
use closeflow_db::{
    connect_with_settings, migrations, FsAttachmentStore, SqlActionLedger, SqlCommentLog,
    SqlRequestStore,
};

const DEMO_SUBMITTER: &str = "demo.submitter@closeflow.dev";
const DEMO_REVIEWERS: [&str; 4] = [
    "demo.manager@closeflow.dev",
    "demo.finance@closeflow.dev",
    "demo.compliance@closeflow.dev",
    "demo.executive@closeflow.dev",
];

enum DemoOutcome {
    /// Walked through every review step to a terminal approval.
    Approved,
    /// Sent back by the manager, awaiting resubmission.
    SentBack,
    /// Left waiting in the manager queue.
    Pending,
}

struct DemoRequest {
    contract_no: &'static str,
    customer_name: &'static str,
    contract_value: &'static str,
    settlement_amount: &'static str,
    outcome: DemoOutcome,
}

const DEMO_DATASET: [DemoRequest; 3] = [
    DemoRequest {
        contract_no: "CT-DEMO-0001",
        customer_name: "Aurora Logistics",
        contract_value: "125000.00",
        settlement_amount: "118000.00",
        outcome: DemoOutcome::Approved,
    },
    DemoRequest {
        contract_no: "CT-DEMO-0002",
        customer_name: "Borealis Mining",
        contract_value: "86000.00",
        settlement_amount: "90500.00",
        outcome: DemoOutcome::SentBack,
    },
    DemoRequest {
        contract_no: "CT-DEMO-0003",
        customer_name: "Cascade Retail",
        contract_value: "42750.50",
        settlement_amount: "42750.50",
        outcome: DemoOutcome::Pending,
    },
];

fn dataset_summary() -> String {
    let lines = [
        "  - CT-DEMO-0001: Aurora Logistics (approved end to end)",
        "  - CT-DEMO-0002: Borealis Mining (sent back, awaiting resubmission)",
        "  - CT-DEMO-0003: Cascade Retail (waiting in manager review)",
    ];
    format!("demo dataset ready for 3 closing requests:\n{}", lines.join("\n"))
}

pub fn run() -> CommandResult {
    let config = match load_config("seed") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match runtime("seed") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let pool = connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;

        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;

        let engine = WorkflowEngine::new(
            StepRegistry::standard(),
            SqlRequestStore::new(pool.clone()),
            SqlActionLedger::new(pool.clone()),
            SqlCommentLog::new(pool.clone()),
            FsAttachmentStore::new(config.attachments.dir.clone()),
        );

        let run_result = load_dataset(&engine)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), 5u8));
        pool.close().await;
        run_result
    });

    match result {
        Ok(()) => CommandResult::success("seed", dataset_summary()),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("seed", error_class, message, exit_code)
        }
    }
}

async fn load_dataset<R, L, C, A>(engine: &WorkflowEngine<R, L, C, A>) -> Result<(), WorkflowError>
where
    R: closeflow_core::RequestStore,
    L: closeflow_core::ActionLedger,
    C: closeflow_core::CommentLog,
    A: closeflow_core::AttachmentStore,
{
    // Re-running seed against the same database is a no-op.
    let existing = engine
        .list(&ListFilter { created_by: Some(DEMO_SUBMITTER.to_string()), ..ListFilter::default() })
        .await?;
    if !existing.is_empty() {
        return Ok(());
    }

    for demo in &DEMO_DATASET {
        let submitted = engine
            .submit(SubmitInput {
                contract_no: demo.contract_no.to_string(),
                customer_name: Some(demo.customer_name.to_string()),
                contract_value: Some(parse_amount(demo.contract_value)?),
                settlement_amount: Some(parse_amount(demo.settlement_amount)?),
                remark: Some("demo dataset".to_string()),
                created_by: DEMO_SUBMITTER.to_string(),
                ..SubmitInput::default()
            })
            .await?;
        let id = submitted.request.id;

        match demo.outcome {
            DemoOutcome::Approved => {
                for reviewer in DEMO_REVIEWERS {
                    engine
                        .act(ActionInput {
                            request_id: id.clone(),
                            decision: Decision::Approve,
                            actor: reviewer.to_string(),
                            comment: None,
                            attachment_refs: Vec::new(),
                        })
                        .await?;
                }
            }
            DemoOutcome::SentBack => {
                engine
                    .act(ActionInput {
                        request_id: id,
                        decision: Decision::SendBack,
                        actor: DEMO_REVIEWERS[0].to_string(),
                        comment: Some("settlement exceeds contract value".to_string()),
                        attachment_refs: Vec::new(),
                    })
                    .await?;
            }
            DemoOutcome::Pending => {}
        }
    }

    Ok(())
}

fn parse_amount(raw: &str) -> Result<Decimal, WorkflowError> {
    raw.parse::<Decimal>()
        .map_err(|error| WorkflowError::Validation(format!("demo amount `{raw}`: {error}")))
}
