//! Scenario graphs.
//!
//! The assignment scenario:
//!
//! ```text
//! registerCustomer → loginCustomer → createTicket → checkAssignment
//!                                  ↘ logout
//! loginAgent → checkAgentView
//! ```
//!
//! `logout` only needs `loginCustomer`, so it runs even when ticket creation
//! failed. `loginAgent` has no prerequisites: agent credentials are worth
//! checking even if the customer phase failed entirely.

use crate::actor::Actor;
use crate::classifier::StepKind;
use crate::config::RunConfig;
use crate::result::{VerificaError, VerificaResult};
use crate::step::{StepAction, StepSpec};
use crate::workflow::Workflow;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Follow-up queries shown (never executed) in the assignment report
pub const ASSIGNMENT_FOLLOW_UP_SQL: &str = "\
-- 최근 생성된 티켓 확인
SELECT id, title, status, agent_id,
       sla_response_deadline, sla_resolve_deadline
FROM tickets
ORDER BY created_at DESC
LIMIT 1;

-- 할당 이력 확인
SELECT * FROM ticket_histories
WHERE ticket_id = (SELECT id FROM tickets ORDER BY created_at DESC LIMIT 1)
ORDER BY created_at DESC;";

/// Which workflow to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Scenario {
    /// Register, log in, create a ticket, check assignment, agent view
    #[default]
    Assignment,
    /// Same as assignment for accounts that already exist
    Existing,
    /// Try each configured credential
    Credentials,
    /// Create the customer and agent accounts through the UI
    Provision,
}

impl Scenario {
    /// All scenarios
    pub const ALL: [Self; 4] = [
        Self::Assignment,
        Self::Existing,
        Self::Credentials,
        Self::Provision,
    ];

    /// Scenario name
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Assignment => "assignment",
            Self::Existing => "existing",
            Self::Credentials => "credentials",
            Self::Provision => "provision",
        }
    }

    /// One-line description
    #[must_use]
    pub const fn description(&self) -> &'static str {
        match self {
            Self::Assignment => "티켓 자동 할당 테스트 (회원가입부터)",
            Self::Existing => "티켓 자동 할당 테스트 (기존 계정)",
            Self::Credentials => "테스트 계정 로그인 확인",
            Self::Provision => "테스트 계정 생성",
        }
    }

    /// Whether the run writes the accounts sheet
    #[must_use]
    pub const fn writes_accounts(&self) -> bool {
        matches!(self, Self::Provision)
    }

    /// Build the workflow for this scenario
    #[must_use]
    pub fn workflow(&self, config: &RunConfig) -> Workflow {
        match self {
            Self::Assignment => assignment(config, true),
            Self::Existing => assignment(config, false),
            Self::Credentials => credentials(&config.credential_candidates),
            Self::Provision => provision(config),
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scenario {
    type Err = VerificaError;

    fn from_str(s: &str) -> VerificaResult<Self> {
        Self::ALL
            .into_iter()
            .find(|scenario| scenario.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| VerificaError::config(format!("unknown scenario: {s}")))
    }
}

fn assignment(config: &RunConfig, register: bool) -> Workflow {
    let customer = &config.actors.customer;
    let agent = &config.actors.agent;
    let name = if register { Scenario::Assignment } else { Scenario::Existing };

    let mut workflow = Workflow::new(name.as_str());
    let mut login_customer = StepSpec::new(
        "loginCustomer",
        StepAction::Login {
            actor: customer.clone(),
        },
        StepKind::Login,
    )
    .described(format!("Customer 로그인 ({})", customer.email));
    if register {
        workflow = workflow.step(
            StepSpec::new(
                "registerCustomer",
                StepAction::Register {
                    actor: customer.clone(),
                },
                StepKind::Registration,
            )
            .described(format!("Customer 회원가입 ({})", customer.email)),
        );
        login_customer = login_customer.requires("registerCustomer");
    }

    workflow
        .step(login_customer)
        .step(
            StepSpec::new(
                "createTicket",
                StepAction::CreateTicket {
                    draft: config.ticket.clone(),
                },
                StepKind::TicketCreation,
            )
            .described("새 티켓 생성")
            .requires("loginCustomer"),
        )
        .step(
            StepSpec::new(
                "checkAssignment",
                StepAction::OpenLatestTicket,
                StepKind::AssignmentCheck {
                    agent_name: agent.display_name.clone(),
                },
            )
            .described("자동 할당 확인")
            .requires("createTicket")
            .optional(),
        )
        .step(
            StepSpec::new("logout", StepAction::Logout, StepKind::Logout)
                .described("Customer 로그아웃")
                .requires("loginCustomer"),
        )
        .step(
            StepSpec::new(
                "loginAgent",
                StepAction::Login {
                    actor: agent.clone(),
                },
                StepKind::Login,
            )
            .described(format!("Agent 로그인 ({})", agent.email)),
        )
        .step(
            StepSpec::new(
                "checkAgentView",
                StepAction::ViewTickets,
                StepKind::RoleView {
                    title: config.ticket.title.clone(),
                },
            )
            .described("Agent가 할당된 티켓 확인")
            .requires("loginAgent")
            .requires("createTicket"),
        )
        .manual_check("SLA 마감 시간 설정됨 (수동 확인 필요)")
        .manual_check("할당 이력 기록됨 (DB 확인 필요)")
        .follow_up_sql(ASSIGNMENT_FOLLOW_UP_SQL)
}

fn credentials(candidates: &[Actor]) -> Workflow {
    candidates
        .iter()
        .enumerate()
        .fold(Workflow::new(Scenario::Credentials.as_str()), |workflow, (i, actor)| {
            let login = format!("login#{}", i + 1);
            workflow
                .step(
                    StepSpec::new(
                        login.clone(),
                        StepAction::Login {
                            actor: actor.clone(),
                        },
                        StepKind::Login,
                    )
                    .described(format!("{} / {} ({})", actor.email, actor.password, actor.role))
                    .optional(),
                )
                .step(
                    StepSpec::new(format!("logout#{}", i + 1), StepAction::Logout, StepKind::Logout)
                        .described(format!("로그아웃 ({})", actor.email))
                        .requires(login)
                        .optional(),
                )
        })
}

fn provision(config: &RunConfig) -> Workflow {
    let customer = &config.actors.customer;
    let agent = &config.actors.agent;
    let admin = &config.actors.admin;
    Workflow::new(Scenario::Provision.as_str())
        .step(
            StepSpec::new(
                "registerCustomer",
                StepAction::Register {
                    actor: customer.clone(),
                },
                StepKind::Registration,
            )
            .described(format!("Customer 계정 생성 ({})", customer.email)),
        )
        .step(
            StepSpec::new("logoutCustomer", StepAction::Logout, StepKind::Logout)
                .described("Customer 로그아웃")
                .requires("registerCustomer"),
        )
        .step(
            StepSpec::new(
                "loginAdmin",
                StepAction::Login {
                    actor: admin.clone(),
                },
                StepKind::Login,
            )
            .described(format!("Admin 로그인 ({})", admin.email)),
        )
        .step(
            StepSpec::new(
                "createAgent",
                StepAction::CreateUser {
                    actor: agent.clone(),
                },
                StepKind::UserProvisioning {
                    email: agent.email.clone(),
                },
            )
            .described(format!("Agent 계정 생성 ({})", agent.email))
            .requires("loginAdmin"),
        )
        .step(
            StepSpec::new(
                "verifyAgentListed",
                StepAction::ListUsers {
                    actor: agent.clone(),
                },
                StepKind::UserListed {
                    email: agent.email.clone(),
                },
            )
            .described("Agent 목록 확인")
            .requires("createAgent"),
        )
}
