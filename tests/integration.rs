//! Integration tests for the job board.
//!
//! Two boards opened on the same temporary directory stand in for two
//! processes sharing storage.

use std::time::Duration;

use internboard::domain::InternshipDraft;
use internboard::{
    ApplicationForm, ApplicationStatus, CompanySignup, InternshipDetails, JobBoard,
    JobBoardBuilder, Origin, Role, StoreError, StudentSignup, WatchConfig,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn open(dir: &std::path::Path) -> JobBoard {
    init_tracing();
    JobBoardBuilder::new()
        .base_dir(dir)
        .watch_config(WatchConfig {
            debounce: Duration::from_millis(20),
        })
        .open()
        .expect("failed to open board")
}

fn posting(title: &str) -> InternshipDraft {
    InternshipDraft {
        company: "Acme".into(),
        company_id: String::new(),
        posted: "March 4".into(),
        details: InternshipDetails {
            title: title.into(),
            ..InternshipDetails::default()
        },
    }
}

fn acme() -> CompanySignup {
    CompanySignup {
        company_name: "Acme".into(),
        industry: "Software".into(),
        website: "https://acme.test".into(),
        email: "jobs@acme.test".into(),
        password: "acme-pw".into(),
    }
}

fn student(email: &str) -> StudentSignup {
    StudentSignup {
        first_name: "Sam".into(),
        last_name: "Student".into(),
        email: email.into(),
        password: "pw".into(),
        university: "State".into(),
    }
}

#[test]
fn sequential_ids_and_remove() {
    let tmp = tempfile::tempdir().expect("failed to create tmpdir");
    let board = open(tmp.path());
    let internships = board.internships();

    let first = internships.insert(posting("Backend Intern")).expect("insert");
    let second = internships.insert(posting("Frontend Intern")).expect("insert");
    assert_eq!((first.id, second.id), (1, 2));

    assert!(internships.remove(&1));
    let remaining: Vec<u64> = internships
        .find_all_where(|_| true)
        .into_iter()
        .map(|i| i.id)
        .collect();
    assert_eq!(remaining, vec![2]);

    // Max + 1, not a reused slot.
    assert_eq!(internships.insert(posting("QA Intern")).expect("insert").id, 3);
}

#[test]
fn fresh_board_sees_the_same_contents() {
    let tmp = tempfile::tempdir().expect("failed to create tmpdir");
    let board = open(tmp.path());
    board.register_company(acme()).expect("register company");
    let internship = board
        .post_internship(InternshipDetails {
            title: "Backend Intern".into(),
            ..InternshipDetails::default()
        })
        .expect("post");
    board.register_student(student("s1@uni.test")).expect("register");
    board
        .submit_application(ApplicationForm {
            internship_id: internship.id,
            cover_letter: "Please".into(),
            ..ApplicationForm::default()
        })
        .expect("apply");

    let reopened = open(tmp.path());
    assert_eq!(reopened.users().all(), board.users().all());
    assert_eq!(reopened.internships().all(), board.internships().all());
    assert_eq!(reopened.applications().all(), board.applications().all());
    assert_eq!(reopened.session().current(), board.session().current());
}

#[test]
fn duplicate_application_rejected_across_boards() {
    let tmp = tempfile::tempdir().expect("failed to create tmpdir");
    let a = open(tmp.path());
    a.register_company(acme()).expect("register company");
    let internship = a
        .post_internship(InternshipDetails::default())
        .expect("post");
    let s1 = a.register_student(student("s1@uni.test")).expect("register");
    a.submit_application(ApplicationForm {
        internship_id: internship.id,
        ..ApplicationForm::default()
    })
    .expect("first application");

    // A second board opened afterwards restores the session and the data.
    let b = open(tmp.path());
    assert_eq!(b.session().current().map(|u| u.id), Some(s1.id.clone()));
    let err = b
        .submit_application(ApplicationForm {
            internship_id: internship.id,
            ..ApplicationForm::default()
        })
        .expect_err("second application");
    assert!(matches!(err, StoreError::AlreadyApplied { .. }));
    assert_eq!(b.applications_for_student(&s1.id).len(), 1);
}

fn named(first: &str, email: &str) -> StudentSignup {
    StudentSignup {
        first_name: first.into(),
        ..student(email)
    }
}

#[test]
fn registrations_on_two_boards_both_survive() {
    let tmp = tempfile::tempdir().expect("failed to create tmpdir");
    let a = open(tmp.path());
    let b = open(tmp.path());

    let alice = a
        .register_student(named("Alice", "alice@uni.test"))
        .expect("register alice");
    let bob = b
        .register_student(named("Bob", "bob@uni.test"))
        .expect("register bob");

    let reopened = open(tmp.path());
    let mut emails: Vec<String> = reopened.users().all().into_iter().map(|u| u.email).collect();
    emails.sort();
    assert_eq!(emails, vec!["alice@uni.test", "bob@uni.test"]);

    assert_eq!(b.get_user_by_id(&alice.id).map(|u| u.email), Some(alice.email));
    assert!(
        b.session()
            .login("alice@uni.test", "pw", Role::Student)
            .expect("login")
    );
    assert_ne!(b.session().current().map(|u| u.id), Some(bob.id));
}

#[test]
fn email_taken_on_another_board_is_rejected() {
    let tmp = tempfile::tempdir().expect("failed to create tmpdir");
    let a = open(tmp.path());
    let b = open(tmp.path());

    a.register_student(named("Alice", "alice@uni.test"))
        .expect("register alice");
    let err = b
        .register_company(CompanySignup {
            email: "alice@uni.test".into(),
            ..acme()
        })
        .expect_err("email already taken");
    assert!(matches!(err, StoreError::DuplicateEmail(email) if email == "alice@uni.test"));

    assert_eq!(open(tmp.path()).users().len(), 1);
}

#[test]
fn profile_edit_keeps_users_registered_elsewhere() {
    let tmp = tempfile::tempdir().expect("failed to create tmpdir");
    let a = open(tmp.path());
    let b = open(tmp.path());

    b.register_student(named("Alice", "alice@uni.test"))
        .expect("register alice");
    let carol = a
        .register_student(named("Carol", "carol@uni.test"))
        .expect("register carol");

    // The session entry now holds Carol; B follows it before editing.
    b.session()
        .login("alice@uni.test", "pw", Role::Student)
        .expect("login");
    b.complete_profile(internboard::UserPatch {
        bio: Some("Compilers".into()),
        ..internboard::UserPatch::default()
    })
    .expect("edit profile");

    let reopened = open(tmp.path());
    assert_eq!(reopened.users().len(), 2);
    assert_eq!(
        reopened.get_user_by_id(&carol.id).map(|u| u.email),
        Some(carol.email)
    );
}

#[test]
fn accepted_status_visible_after_reload() {
    let tmp = tempfile::tempdir().expect("failed to create tmpdir");
    let a = open(tmp.path());
    a.register_company(acme()).expect("register company");
    let internship = a
        .post_internship(InternshipDetails::default())
        .expect("post");
    a.register_student(student("s1@uni.test")).expect("register");
    let application = a
        .submit_application(ApplicationForm {
            internship_id: internship.id,
            ..ApplicationForm::default()
        })
        .expect("apply");

    let b = open(tmp.path());

    a.session()
        .login("jobs@acme.test", "acme-pw", Role::Company)
        .expect("login");
    a.update_application_status(application.id, ApplicationStatus::Accepted, None)
        .expect("accept");
    assert_eq!(
        a.applications().find_by_id(&application.id).map(|x| x.status),
        Some(ApplicationStatus::Accepted)
    );

    // Opened outside a runtime, b has no watcher and has not reloaded yet.
    assert_eq!(
        b.applications().find_by_id(&application.id).map(|x| x.status),
        Some(ApplicationStatus::Pending)
    );
    b.applications().load_all().expect("reload");
    assert_eq!(
        b.applications().find_by_id(&application.id).map(|x| x.status),
        Some(ApplicationStatus::Accepted)
    );
}

#[tokio::test]
async fn watcher_delivers_foreign_status_change() {
    let tmp = tempfile::tempdir().expect("failed to create tmpdir");
    let a = open(tmp.path());
    a.register_company(acme()).expect("register company");
    let internship = a
        .post_internship(InternshipDetails::default())
        .expect("post");
    a.register_student(student("s1@uni.test")).expect("register");
    let application = a
        .submit_application(ApplicationForm {
            internship_id: internship.id,
            ..ApplicationForm::default()
        })
        .expect("apply");
    a.session()
        .login("jobs@acme.test", "acme-pw", Role::Company)
        .expect("login");

    let b = open(tmp.path());
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    b.bus().subscribe("applicationsChanged", move |notice| {
        let _ = tx.send(notice.origin);
    });

    a.update_application_status(application.id, ApplicationStatus::Accepted, None)
        .expect("accept");

    let origin = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("notice should arrive")
        .expect("channel open");
    assert_eq!(origin, Origin::External);
    assert_eq!(
        b.applications().find_by_id(&application.id).map(|x| x.status),
        Some(ApplicationStatus::Accepted)
    );

    b.close().await.expect("close");
}

#[tokio::test]
async fn board_opened_in_a_runtime_sees_foreign_postings() {
    let tmp = tempfile::tempdir().expect("failed to create tmpdir");
    let a = open(tmp.path());
    let b = open(tmp.path());
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    b.bus().subscribe("internshipsChanged", move |notice| {
        let _ = tx.send(notice.origin);
    });

    a.internships()
        .insert(posting("Data Intern"))
        .expect("insert");

    let origin = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("notice should arrive")
        .expect("channel open");
    assert_eq!(origin, Origin::External);
    let titles: Vec<String> = b
        .internships()
        .all()
        .into_iter()
        .map(|i| i.details.title)
        .collect();
    assert_eq!(titles, vec!["Data Intern"]);

    a.close().await.expect("close");
    b.close().await.expect("close");
}

#[tokio::test]
async fn watcher_follows_foreign_logout() {
    let tmp = tempfile::tempdir().expect("failed to create tmpdir");
    let a = open(tmp.path());
    a.register_student(student("s1@uni.test")).expect("register");

    let b = open(tmp.path());
    assert!(b.session().is_authenticated());
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    b.bus().subscribe(internboard::SESSION_CHANNEL, move |notice| {
        let _ = tx.send(notice.origin);
    });

    a.session().logout().expect("logout");

    let origin = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("notice should arrive")
        .expect("channel open");
    assert_eq!(origin, Origin::External);
    assert!(!b.session().is_authenticated());

    a.close().await.expect("close");
    b.close().await.expect("close");
}
