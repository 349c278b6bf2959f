//! Demo command - an accreditation vote from registration to issuance
//!
//! Runs entirely in memory against a manual clock, so the voting window
//! and the timelock are crossed instantly.

use accredo_core::{
    Account, GovernanceParams, ProposalAction, Role, TokenId, VoteSupport, WalletAddress,
};
use accredo_governance::{Governor, ManualClock};
use anyhow::Result;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;

const STEPS: u64 = 7;

fn random_address() -> WalletAddress {
    WalletAddress::from_bytes(rand::random())
}

fn step(bar: &ProgressBar, message: String) {
    bar.inc(1);
    bar.println(format!("{} {}", style("✓").green(), message));
}

pub async fn run() -> Result<()> {
    let params = GovernanceParams {
        voting_delay_blocks: 1,
        voting_period_blocks: 20,
        quorum: 3,
        timelock_delay_secs: 3_600,
        minimum_delay_secs: 3_600,
        grace_period_secs: 86_400,
        ..GovernanceParams::default()
    };
    let clock = Arc::new(ManualClock::starting_now());
    let governor = Governor::in_memory(params.clone(), clock.clone()).await?;

    println!("\n{}", style("Accredo demo").cyan().bold());
    println!(
        "  quorum {}, voting period {} blocks, timelock {}s\n",
        params.quorum, params.voting_period_blocks, params.timelock_delay_secs
    );

    let bar = ProgressBar::new(STEPS);
    if let Ok(style) = ProgressStyle::with_template("[{bar:30.cyan/blue}] {pos}/{len}") {
        bar.set_style(style.progress_chars("=> "));
    }

    let admin = random_address();
    governor.bootstrap_admin(admin, "Demo Admin").await?;

    let members = [random_address(), random_address()];
    for (member, weight) in members.iter().zip([2, 1]) {
        governor
            .register_account(&admin, Account::new(*member, Role::DaoMember, "DAO member"), Some(weight))
            .await?;
    }
    step(&bar, format!("admin {admin} registered {} DAO members", members.len()));

    let institute = random_address();
    governor
        .register_account(&institute, Account::new(institute, Role::Institute, "Demo University"), None)
        .await?;
    governor
        .register_issuer(&institute, institute, "Demo University", Some("ipfs://demo-university".into()))
        .await?;
    step(&bar, format!("institute {institute} registered as issuer"));

    let proposal = governor
        .create_proposal(
            &members[0],
            ProposalAction::AccreditIssuer,
            Some(institute),
            "Accredit Demo University",
        )
        .await?;
    step(&bar, format!("proposal {} created", proposal.id.short()));

    clock.advance_blocks(params.voting_delay_blocks);
    for member in &members {
        governor
            .cast_vote(member, &proposal.id, VoteSupport::For, None)
            .await?;
    }
    step(&bar, "all members voted in favour".to_string());

    clock.advance_blocks(params.voting_period_blocks + 1);
    let state = governor.resolve(&members[1], &proposal.id).await?;
    let entry = governor.queue(&members[1], &proposal.id).await?;
    step(&bar, format!("voting closed as {state}; queued until {}", entry.eta));

    clock.advance_secs(params.timelock_delay_secs as i64);
    let executed = governor.execute(&members[0], &proposal.id).await?;
    step(&bar, format!("proposal {}", executed.state));

    let student = random_address();
    let credential = governor
        .issue_credential(&institute, TokenId(1), None, student, Some("ipfs://diploma".into()))
        .await?;
    step(
        &bar,
        format!("credential #{} issued to {}", credential.token_id, credential.holder),
    );
    bar.finish_and_clear();

    let eligible = governor.registry().is_eligible_issuer(&institute).await?;
    println!(
        "\nInstitute eligible to issue: {}",
        if eligible {
            style("yes").green()
        } else {
            style("no").red()
        }
    );
    Ok(())
}
