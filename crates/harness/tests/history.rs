use scriptdesk_core::{AuditAction, Caller, EditPayload, EditorToken, EntityType, QuestionKind, TenantId};
use scriptdesk_engine::EngineError;
use scriptdesk_harness::TestDesk;
use scriptdesk_storage::EntityAccess;

// ============================================================================
// Version numbering
// ============================================================================

#[test]
fn sequential_commits_are_numbered_one_to_n() -> Result<(), Box<dyn std::error::Error>> {
    let mut desk = TestDesk::new()?;
    let author = desk.caller("Prospero");
    let id = desk.create_named(&author, EntityType::Quest, "v1")?;

    for n in 2..=6 {
        let outcome = desk.engine.commit(
            &author,
            EntityType::Quest,
            Some(id),
            &EditPayload::named(format!("v{n}")),
            false,
        )?;
        assert_eq!(outcome.version.unwrap().version, n);
    }

    let versions: Vec<i64> = desk
        .engine
        .versions(&author, EntityType::Quest, id)?
        .iter()
        .map(|v| v.version)
        .collect();
    assert_eq!(versions, vec![1, 2, 3, 4, 5, 6]);
    Ok(())
}

#[test]
fn versions_are_counted_per_entity() -> Result<(), Box<dyn std::error::Error>> {
    let mut desk = TestDesk::new()?;
    let author = desk.caller("Prospero");
    let a = desk.create_named(&author, EntityType::Trait, "Brave")?;
    let b = desk.create_named(&author, EntityType::Trait, "Wise")?;
    desk.engine
        .commit(&author, EntityType::Trait, Some(a), &EditPayload::named("Braver"), false)?;

    assert_eq!(desk.engine.versions(&author, EntityType::Trait, a)?.len(), 2);
    assert_eq!(desk.engine.versions(&author, EntityType::Trait, b)?.len(), 1);
    Ok(())
}

#[test]
fn version_records_author_and_text() -> Result<(), Box<dyn std::error::Error>> {
    let mut desk = TestDesk::new()?;
    let author = desk.caller("Miranda");
    let id = desk.create(
        &author,
        EntityType::Handout,
        EditPayload::named("Letter").with_text("<p>Dear father</p>"),
    )?;

    let v1 = desk.engine.version(&author, EntityType::Handout, id, 1)?;
    assert_eq!(v1.author, "Miranda");
    assert_eq!(v1.text, "<p>Dear father</p>");
    assert!(!v1.deleted);
    assert!(matches!(
        desk.engine.version(&author, EntityType::Handout, id, 2),
        Err(EngineError::NotFound)
    ));
    Ok(())
}

// ============================================================================
// Drafts and commits
// ============================================================================

#[test]
fn autosave_then_commit_yields_one_version() -> Result<(), Box<dyn std::error::Error>> {
    let mut desk = TestDesk::new()?;
    let (author, token) = desk.session("Ariel");

    let payload = EditPayload::named("Sing to Ferdinand").with_text("Full fathom five");
    let res = desk
        .engine
        .autosave(&author, EntityType::Quest, None, &payload, Some(&token))?;
    let id = res.draft_id.expect("first autosave creates the draft");
    desk.engine
        .autosave(&author, EntityType::Quest, Some(id), &payload, Some(&token))?;
    assert!(
        desk.engine
            .storage()
            .get_versions(EntityType::Quest, id)?
            .is_empty()
    );

    let outcome = desk
        .engine
        .commit(&author, EntityType::Quest, Some(id), &payload, false)?;
    assert!(outcome.success);
    assert!(!outcome.entity.unwrap().temp);
    assert!(!desk.engine.get_entity(&author, EntityType::Quest, id)?.temp);

    let versions = desk.engine.versions(&author, EntityType::Quest, id)?;
    assert_eq!(versions.len(), 1);
    assert_eq!(versions[0].text, "Full fathom five");

    let actions: Vec<AuditAction> = desk
        .engine
        .audit_entries(&author, EntityType::Quest, id)?
        .into_iter()
        .map(|a| a.action)
        .collect();
    assert_eq!(actions, vec![AuditAction::New]);
    Ok(())
}

#[test]
fn autosave_on_committed_entity_keeps_canonical_content() -> Result<(), Box<dyn std::error::Error>> {
    let mut desk = TestDesk::new()?;
    let (author, token) = desk.session("Gonzalo");
    let id = desk.create_named(&author, EntityType::Prologue, "Calm seas")?;

    let res = desk.engine.autosave(
        &author,
        EntityType::Prologue,
        Some(id),
        &EditPayload::named("Rough seas"),
        Some(&token),
    )?;
    assert!(res.is_ok());
    assert!(res.draft_id.is_none());

    let canonical = desk.engine.get_entity(&author, EntityType::Prologue, id)?;
    assert_eq!(canonical.name, "Calm seas");
    assert!(!canonical.temp);
    let draft = desk
        .engine
        .load_draft(&author, EntityType::Prologue, id)?
        .expect("draft stored beside the entity");
    assert_eq!(draft.payload.name, "Rough seas");
    assert_eq!(desk.engine.versions(&author, EntityType::Prologue, id)?.len(), 1);

    desk.engine.commit(
        &author,
        EntityType::Prologue,
        Some(id),
        &EditPayload::named("Rough seas"),
        false,
    )?;
    assert!(desk.engine.load_draft(&author, EntityType::Prologue, id)?.is_none());
    assert_eq!(desk.engine.get_entity(&author, EntityType::Prologue, id)?.name, "Rough seas");
    assert_eq!(desk.engine.versions(&author, EntityType::Prologue, id)?.len(), 2);
    Ok(())
}

// ============================================================================
// Deletion
// ============================================================================

#[test]
fn delete_records_final_version_and_keeps_history() -> Result<(), Box<dyn std::error::Error>> {
    let mut desk = TestDesk::new()?;
    let author = desk.caller("Prospero");
    let id = desk.create_named(&author, EntityType::Plot, "Draft 1")?;
    for name in ["Draft 2", "Draft 3"] {
        desk.engine
            .commit(&author, EntityType::Plot, Some(id), &EditPayload::named(name), false)?;
    }
    assert_eq!(desk.engine.versions(&author, EntityType::Plot, id)?.len(), 3);

    let outcome = desk
        .engine
        .commit(&author, EntityType::Plot, Some(id), &EditPayload::default(), true)?;
    assert!(outcome.success);
    assert_eq!(outcome.message.as_deref(), Some("Plot \"Draft 3\" deleted"));
    let v4 = outcome.version.unwrap();
    assert_eq!(v4.version, 4);
    assert!(v4.deleted);

    assert!(matches!(
        desk.engine.get_entity(&author, EntityType::Plot, id),
        Err(EngineError::NotFound)
    ));
    assert!(matches!(
        desk.engine.get_entity_for_edit(&author, EntityType::Plot, id),
        Err(EngineError::NotFound)
    ));

    let history = desk.engine.versions(&author, EntityType::Plot, id)?;
    assert_eq!(history.len(), 4);
    assert_eq!(history.iter().filter(|v| v.deleted).count(), 1);
    assert_eq!(desk.engine.version(&author, EntityType::Plot, id, 2)?.version, 2);

    let last = desk.engine.audit_entries(&author, EntityType::Plot, id)?;
    assert_eq!(last.last().unwrap().action, AuditAction::Delete);
    Ok(())
}

#[test]
fn repeated_delete_is_a_silent_noop() -> Result<(), Box<dyn std::error::Error>> {
    let mut desk = TestDesk::new()?;
    let author = desk.caller("Prospero");
    let id = desk.create_named(&author, EntityType::Trait, "Vengeful")?;

    desk.engine
        .commit(&author, EntityType::Trait, Some(id), &EditPayload::default(), true)?;
    let again = desk
        .engine
        .commit(&author, EntityType::Trait, Some(id), &EditPayload::default(), true)?;
    assert!(again.success);
    assert!(again.version.is_none());
    assert_eq!(desk.engine.versions(&author, EntityType::Trait, id)?.len(), 2);
    Ok(())
}

#[test]
fn deleting_an_uncommitted_draft_records_nothing() -> Result<(), Box<dyn std::error::Error>> {
    let mut desk = TestDesk::new()?;
    let (author, token) = desk.session("Stephano");
    let id = desk
        .engine
        .autosave(&author, EntityType::Quest, None, &EditPayload::named("Steal wine"), Some(&token))?
        .draft_id
        .unwrap();

    let outcome = desk
        .engine
        .commit(&author, EntityType::Quest, Some(id), &EditPayload::default(), true)?;
    assert!(outcome.success);
    assert!(outcome.version.is_none());
    assert!(desk.engine.storage().get_entity(id)?.is_none());
    assert!(desk.engine.storage().get_versions(EntityType::Quest, id)?.is_empty());
    Ok(())
}

// ============================================================================
// Snapshot content
// ============================================================================

#[test]
fn character_snapshot_lists_answers_and_relationships() -> Result<(), Box<dyn std::error::Error>> {
    let mut desk = TestDesk::new()?;
    let author = desk.caller("Prospero");
    desk.create_question(&author, EntityType::Character, "Name", QuestionKind::Name)?;
    let background =
        desk.create_question(&author, EntityType::Character, "Background", QuestionKind::Paragraph)?;
    let temper = desk.create_question(&author, EntityType::Character, "Temper", QuestionKind::Single)?;
    let mild = desk.create_option(&author, temper, "Mild")?;
    desk.create_option(&author, temper, "Stormy")?;
    desk.create_question(&author, EntityType::Character, "Secret", QuestionKind::ShortText)?;

    let master = desk.create_named(&author, EntityType::Character, "Prospero")?;
    let payload = EditPayload::named("Ariel")
        .with_answer(background, "Bound to the island")
        .with_choices(temper, vec![mild]);
    let ariel = desk.create(&author, EntityType::Character, payload.clone())?;
    desk.engine
        .add_relationship(&author, ariel, master, "<p>Serves <i>him</i></p>")?;

    let outcome = desk
        .engine
        .commit(&author, EntityType::Character, Some(ariel), &payload, false)?;
    assert_eq!(
        outcome.version.unwrap().text,
        "Name: Ariel\nBackground: Bound to the island\nTemper: Mild\n\nRelationships\nProspero: Serves him"
    );
    Ok(())
}

#[test]
fn plot_snapshot_lists_attached_characters() -> Result<(), Box<dyn std::error::Error>> {
    let mut desk = TestDesk::new()?;
    let author = desk.caller("Prospero");
    let plot = desk.create(
        &author,
        EntityType::Plot,
        EditPayload::named("Tempest").with_text("A storm wrecks the ship."),
    )?;
    let ferdinand = desk.create_named(&author, EntityType::Character, "Ferdinand")?;
    let alonso = desk.create_named(&author, EntityType::Character, "Alonso")?;
    desk.engine
        .attach_character(&author, plot, ferdinand, "Believes his father drowned")?;
    desk.engine.attach_character(&author, plot, alonso, "")?;

    let outcome = desk.engine.commit(
        &author,
        EntityType::Plot,
        Some(plot),
        &EditPayload::named("Tempest").with_text("A storm wrecks the ship."),
        false,
    )?;
    assert_eq!(
        outcome.version.unwrap().text,
        "A storm wrecks the ship.\n\nCharacters\nFerdinand: Believes his father drowned\nAlonso"
    );
    Ok(())
}

// ============================================================================
// Tenant isolation
// ============================================================================

#[test]
fn history_of_other_tenants_is_not_found() -> Result<(), Box<dyn std::error::Error>> {
    let mut desk = TestDesk::new()?;
    let author = desk.caller("Prospero");
    let id = desk.create_named(&author, EntityType::Quest, "Private")?;
    let stranger = Caller::new(TenantId::new(99), "Mallory");

    assert!(matches!(
        desk.engine.versions(&stranger, EntityType::Quest, id),
        Err(EngineError::NotFound)
    ));
    assert!(matches!(
        desk.engine.audit_entries(&stranger, EntityType::Quest, id),
        Err(EngineError::NotFound)
    ));
    assert!(matches!(
        desk.engine.commit(&stranger, EntityType::Quest, Some(id), &EditPayload::named("Mine"), false),
        Err(EngineError::NotFound)
    ));
    assert!(matches!(
        desk.engine.autosave(
            &stranger,
            EntityType::Quest,
            Some(id),
            &EditPayload::named("Mine"),
            Some(&EditorToken::generate())
        ),
        Err(EngineError::NotFound)
    ));

    // Deleting from the wrong tenant reads as already gone and touches nothing.
    let outcome = desk
        .engine
        .commit(&stranger, EntityType::Quest, Some(id), &EditPayload::default(), true)?;
    assert!(outcome.success);
    assert_eq!(desk.engine.get_entity(&author, EntityType::Quest, id)?.name, "Private");
    Ok(())
}
