use chrono::{DateTime, Duration, TimeZone, Utc};
use family_hub::db::*;
use family_hub::models::*;
use speculate2::speculate;
use tokio_test::block_on;
use uuid::Uuid;

fn at(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, day, hour, 0, 0).unwrap()
}

fn member(first: &str, last: &str) -> FamilyMember {
    FamilyMember::new(first.to_string(), last.to_string(), None, None, at(1, 8))
}

fn draft(title: &str, priority: TaskPriority, due_date: Option<DateTime<Utc>>) -> TaskDraft {
    TaskDraft {
        title: title.to_string(),
        description: None,
        priority,
        due_date,
        assigned_to_id: None,
    }
}

fn save(db: &Database, changes: &mut ChangeSet, now: DateTime<Utc>, user: &str) -> usize {
    let mut tx = block_on(db.begin()).expect("Failed to begin");
    let rows = changes
        .save_changes(&tx, now, user)
        .expect("Failed to save changes");
    tx.record_writes(rows);
    tx.commit().expect("Failed to commit");
    rows
}

fn load_task(db: &Database, id: Uuid) -> Option<Task> {
    let conn = block_on(db.lock());
    Task::load(&conn, id).expect("Query failed")
}

speculate! {
    before {
        let db = Database::open_memory().expect("Failed to create in-memory database");
        block_on(db.migrate()).expect("Failed to run migrations");
    }

    describe "members" {
        it "round-trips a member through the store" {
            let marie = FamilyMember::new(
                "Marie".to_string(),
                "Curie".to_string(),
                Some("marie@example.com".to_string()),
                Some("Parent".to_string()),
                at(1, 8),
            );
            let mut changes = ChangeSet::new();
            changes.add(marie.clone());
            assert_eq!(save(&db, &mut changes, at(1, 9), "system"), 1);

            let conn = block_on(db.lock());
            let loaded = FamilyMember::load(&conn, marie.id).expect("Query failed");
            assert_eq!(loaded, Some(marie));
        }

        it "lists members by first name with assigned task counts" {
            let zoe = member("Zoe", "Adams");
            let adam = member("Adam", "Zane");

            let mut changes = ChangeSet::new();
            changes.add(zoe.clone());
            changes.add(adam.clone());
            let mut first = draft("Dishes", TaskPriority::Medium, None);
            first.assigned_to_id = Some(zoe.id);
            let mut second = draft("Laundry", TaskPriority::Low, None);
            second.assigned_to_id = Some(zoe.id);
            changes.add(Task::create(first, at(1, 8)).0);
            changes.add(Task::create(second, at(1, 8)).0);
            save(&db, &mut changes, at(1, 9), "system");

            let conn = block_on(db.lock());
            let members = list_members_with_task_counts(&conn).expect("Query failed");
            let summary: Vec<_> = members
                .iter()
                .map(|(m, count)| (m.first_name.as_str(), *count))
                .collect();
            assert_eq!(summary, vec![("Adam", 0), ("Zoe", 2)]);
        }

        it "clears task assignees when a member is deleted" {
            let bob = member("Bob", "Builder");
            let mut assigned = draft("Fix the fence", TaskPriority::High, None);
            assigned.assigned_to_id = Some(bob.id);
            let (task, _) = Task::create(assigned, at(1, 8));
            let item = ShoppingItem::new("Nails".to_string(), 100, None, Some(bob.id), at(1, 8));

            let mut changes = ChangeSet::new();
            changes.add(bob.clone());
            changes.add(task.clone());
            changes.add(item.clone());
            save(&db, &mut changes, at(1, 9), "system");

            let mut changes = ChangeSet::new();
            {
                let tx = block_on(db.begin()).expect("Failed to begin");
                let removed = changes.remove::<FamilyMember>(&tx, bob.id).expect("Remove failed");
                assert!(removed.is_some());
                changes.save_changes(&tx, at(2, 9), "system").expect("Save failed");
                tx.commit().expect("Commit failed");
            }

            let reloaded = load_task(&db, task.id).expect("Task should survive");
            assert!(reloaded.assigned_to_id.is_none());

            let conn = block_on(db.lock());
            let items = list_shopping_items(&conn, true).expect("Query failed");
            assert_eq!(items.len(), 1);
            assert!(items[0].item.added_by_id.is_none());
            assert!(items[0].added_by_name.is_none());
        }
    }

    describe "tasks" {
        it "stamps creation audit fields at save time" {
            let (task, _) = Task::create(draft("Buy milk", TaskPriority::Medium, None), at(1, 8));
            let mut changes = ChangeSet::new();
            changes.add(task.clone());
            save(&db, &mut changes, at(1, 10), "alice");

            let loaded = load_task(&db, task.id).unwrap();
            assert_eq!(loaded.audit.created, at(1, 10));
            assert_eq!(loaded.audit.created_by.as_deref(), Some("alice"));
            assert!(loaded.audit.modified.is_none());
            assert!(loaded.audit.modified_by.is_none());
        }

        it "stamps modification audit fields only for changed tasks" {
            let (changed, _) = Task::create(draft("Walk the dog", TaskPriority::Low, None), at(1, 8));
            let (untouched, _) = Task::create(draft("Feed the cat", TaskPriority::Low, None), at(1, 8));
            let mut changes = ChangeSet::new();
            changes.add(changed.clone());
            changes.add(untouched.clone());
            save(&db, &mut changes, at(1, 9), "alice");

            let mut changes = ChangeSet::new();
            let tx = block_on(db.begin()).expect("Failed to begin");
            changes
                .find::<Task>(&tx, changed.id)
                .expect("Query failed")
                .expect("Task should exist")
                .increase_priority()
                .expect("Low can be raised");
            changes.find::<Task>(&tx, untouched.id).expect("Query failed");
            let rows = changes.save_changes(&tx, at(2, 12), "bob").expect("Save failed");
            tx.commit().expect("Commit failed");

            assert_eq!(rows, 1);

            let changed = load_task(&db, changed.id).unwrap();
            assert_eq!(changed.priority(), TaskPriority::Medium);
            assert_eq!(changed.audit.created_by.as_deref(), Some("alice"));
            assert_eq!(changed.audit.modified, Some(at(2, 12)));
            assert_eq!(changed.audit.modified_by.as_deref(), Some("bob"));

            let untouched = load_task(&db, untouched.id).unwrap();
            assert!(untouched.audit.modified.is_none());
        }

        it "orders by priority, then due date with undated tasks last" {
            let mut changes = ChangeSet::new();
            changes.add(Task::create(draft("low", TaskPriority::Low, Some(at(2, 8))), at(1, 8)).0);
            changes.add(Task::create(draft("high undated", TaskPriority::High, None), at(1, 8)).0);
            changes.add(Task::create(draft("high later", TaskPriority::High, Some(at(9, 8))), at(1, 8)).0);
            changes.add(Task::create(draft("high sooner", TaskPriority::High, Some(at(3, 8))), at(1, 8)).0);
            changes.add(Task::create(draft("medium", TaskPriority::Medium, None), at(1, 8)).0);
            save(&db, &mut changes, at(1, 9), "system");

            let conn = block_on(db.lock());
            let titles: Vec<_> = list_task_rows(&conn)
                .expect("Query failed")
                .into_iter()
                .map(|row| row.task.title)
                .collect();
            assert_eq!(
                titles,
                vec!["high sooner", "high later", "high undated", "medium", "low"]
            );
        }

        it "resolves the assignee name for a single task" {
            let ada = member("Ada", "Lovelace");
            let mut assigned = draft("Write notes", TaskPriority::Medium, None);
            assigned.assigned_to_id = Some(ada.id);
            let (task, _) = Task::create(assigned, at(1, 8));

            let mut changes = ChangeSet::new();
            changes.add(ada);
            changes.add(task.clone());
            save(&db, &mut changes, at(1, 9), "system");

            let conn = block_on(db.lock());
            let row = find_task_row(&conn, task.id).expect("Query failed").expect("Task should exist");
            assert_eq!(row.assignee_name.as_deref(), Some("Ada Lovelace"));
            assert!(find_task_row(&conn, Uuid::new_v4()).expect("Query failed").is_none());
        }

        it "persists completion state" {
            let (task, _) = Task::create(draft("Taxes", TaskPriority::High, None), at(1, 8));
            let mut changes = ChangeSet::new();
            changes.add(task.clone());
            save(&db, &mut changes, at(1, 9), "system");

            let mut changes = ChangeSet::new();
            let tx = block_on(db.begin()).expect("Failed to begin");
            changes
                .find::<Task>(&tx, task.id)
                .unwrap()
                .unwrap()
                .complete(at(5, 17))
                .expect("First completion succeeds");
            changes.save_changes(&tx, at(5, 17), "system").expect("Save failed");
            tx.commit().expect("Commit failed");

            let loaded = load_task(&db, task.id).unwrap();
            assert_eq!(loaded.status(), TaskStatus::Done);
            assert_eq!(loaded.completed_at(), Some(at(5, 17)));
        }
    }

    describe "shopping_items" {
        it "hides purchased items unless asked and sorts by category then name" {
            let mut bought = ShoppingItem::new("Apples".to_string(), 6, Some("Fruit".to_string()), None, at(1, 8));
            bought.mark_as_purchased();

            let mut changes = ChangeSet::new();
            changes.add(bought);
            changes.add(ShoppingItem::new("Yogurt".to_string(), 2, Some("Dairy".to_string()), None, at(1, 8)));
            changes.add(ShoppingItem::new("Bananas".to_string(), 1, Some("Fruit".to_string()), None, at(1, 8)));
            changes.add(ShoppingItem::new("Butter".to_string(), 1, Some("Dairy".to_string()), None, at(1, 8)));
            save(&db, &mut changes, at(1, 9), "system");

            let conn = block_on(db.lock());
            let open: Vec<_> = list_shopping_items(&conn, false)
                .expect("Query failed")
                .into_iter()
                .map(|row| row.item.name)
                .collect();
            assert_eq!(open, vec!["Butter", "Yogurt", "Bananas"]);

            let all = list_shopping_items(&conn, true).expect("Query failed");
            assert_eq!(all.len(), 4);
            assert!(all.iter().any(|row| row.item.name == "Apples" && row.item.is_purchased()));
        }

        it "writes nothing when an item is marked purchased twice" {
            let item = ShoppingItem::new("Bread".to_string(), 1, None, None, at(1, 8));
            let mut changes = ChangeSet::new();
            changes.add(item.clone());
            save(&db, &mut changes, at(1, 9), "system");

            let mut changes = ChangeSet::new();
            let tx = block_on(db.begin()).expect("Failed to begin");
            changes.find::<ShoppingItem>(&tx, item.id).unwrap().unwrap().mark_as_purchased();
            assert_eq!(changes.save_changes(&tx, at(1, 10), "system").unwrap(), 1);
            changes.find::<ShoppingItem>(&tx, item.id).unwrap().unwrap().mark_as_purchased();
            assert_eq!(changes.save_changes(&tx, at(1, 11), "system").unwrap(), 0);
            tx.commit().expect("Commit failed");
        }
    }

    describe "change_set" {
        it "reports entries in visit order with their states" {
            let (existing, _) = Task::create(draft("Existing", TaskPriority::Medium, None), at(1, 8));
            let mut changes = ChangeSet::new();
            changes.add(existing.clone());
            save(&db, &mut changes, at(1, 9), "system");

            let mut changes = ChangeSet::new();
            let tx = block_on(db.begin()).expect("Failed to begin");
            let newcomer = member("New", "Comer");
            changes.add(newcomer.clone());
            changes.find::<Task>(&tx, existing.id).unwrap().unwrap().title = "Renamed".to_string();

            assert_eq!(
                changes.entries(),
                vec![
                    StagedEntry { kind: EntityKind::Member, id: newcomer.id, state: EntryState::Added },
                    StagedEntry { kind: EntityKind::Task, id: existing.id, state: EntryState::Modified },
                ]
            );
            assert!(changes.has_changes());

            changes.save_changes(&tx, at(1, 10), "system").expect("Save failed");
            assert!(!changes.has_changes());
            assert!(changes.entries().iter().all(|e| e.state == EntryState::Unchanged));
        }

        it "detaches an entity added and removed in the same unit" {
            let (task, created) = Task::create(draft("Fleeting", TaskPriority::Low, None), at(1, 8));
            let mut changes = ChangeSet::new();
            let tx = block_on(db.begin()).expect("Failed to begin");
            changes.add_with_events(task.clone(), vec![created]);

            let removed = changes.remove::<Task>(&tx, task.id).expect("Remove failed");
            assert!(removed.is_some());
            assert_eq!(changes.entries()[0].state, EntryState::Detached);
            assert!(changes.find::<Task>(&tx, task.id).unwrap().is_none());

            assert_eq!(changes.save_changes(&tx, at(1, 9), "system").unwrap(), 0);
            assert!(changes.drain_events().is_empty());
        }

        it "drains events once, in visit order, with the saved audit" {
            let (first, first_created) = Task::create(draft("First", TaskPriority::Low, None), at(1, 8));
            let (second, second_created) = Task::create(draft("Second", TaskPriority::Low, None), at(1, 8));

            let mut changes = ChangeSet::new();
            changes.add_with_events(first.clone(), vec![first_created]);
            changes.add_with_events(second.clone(), vec![second_created]);
            assert_eq!(changes.pending_events(), 2);
            save(&db, &mut changes, at(1, 9), "carol");

            let events = changes.drain_events();
            let ids: Vec<_> = events.iter().map(DomainEvent::entity_id).collect();
            assert_eq!(ids, vec![first.id, second.id]);
            assert_eq!(events[0].task().audit.created_by.as_deref(), Some("carol"));
            assert_eq!(events[0].task().audit.created, at(1, 9));

            assert!(changes.drain_events().is_empty());
            assert_eq!(changes.pending_events(), 0);
        }

        it "leaves the store untouched when a save fails and is rolled back" {
            let (existing, _) = Task::create(draft("Keep me", TaskPriority::Medium, None), at(1, 8));
            let mut changes = ChangeSet::new();
            changes.add(existing.clone());
            save(&db, &mut changes, at(1, 9), "system");
            let writes_before = db.committed_writes();

            let mut orphan = draft("Orphan", TaskPriority::Low, None);
            orphan.assigned_to_id = Some(Uuid::new_v4());
            let (orphan, _) = Task::create(orphan, at(2, 8));

            let mut changes = ChangeSet::new();
            let tx = block_on(db.begin()).expect("Failed to begin");
            let newcomer = member("Written", "First");
            changes.add(newcomer.clone());
            changes.find::<Task>(&tx, existing.id).unwrap().unwrap().title = "Changed".to_string();
            changes.add(orphan.clone());

            assert!(changes.save_changes(&tx, at(2, 9), "system").is_err());
            tx.rollback().expect("Rollback failed");

            let conn = block_on(db.lock());
            assert!(FamilyMember::load(&conn, newcomer.id).unwrap().is_none());
            drop(conn);

            let kept = load_task(&db, existing.id).unwrap();
            assert_eq!(kept.title, "Keep me");
            assert!(kept.audit.modified.is_none());
            assert!(load_task(&db, orphan.id).is_none());
            assert_eq!(db.committed_writes(), writes_before);
        }

        it "returns None for unknown ids" {
            let mut changes = ChangeSet::new();
            let conn = block_on(db.lock());
            assert!(changes.find::<Task>(&conn, Uuid::new_v4()).unwrap().is_none());
            assert!(changes.remove::<ShoppingItem>(&conn, Uuid::new_v4()).unwrap().is_none());
            assert!(changes.entries().is_empty());
        }
    }

    describe "on_disk" {
        it "keeps committed data across reopen" {
            let dir = tempfile::tempdir().expect("Failed to create temp dir");
            let path = dir.path().join("nested").join("family-hub.db");
            let task = Task::create(draft("Durable", TaskPriority::High, Some(at(1, 8) + Duration::days(3))), at(1, 8)).0;

            {
                let disk = Database::open(path.clone()).expect("Failed to open");
                block_on(disk.migrate()).expect("Failed to migrate");
                let mut changes = ChangeSet::new();
                changes.add(task.clone());
                save(&disk, &mut changes, at(1, 9), "system");
            }

            let reopened = Database::open(path).expect("Failed to reopen");
            block_on(reopened.migrate()).expect("Migrations should be idempotent");
            let loaded = load_task(&reopened, task.id).expect("Task should persist");
            assert_eq!(loaded.title, "Durable");
            assert_eq!(loaded.due_date, task.due_date);
        }
    }
}
