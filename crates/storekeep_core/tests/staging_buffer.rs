use storekeep_core::{
    DeleteEffect, ProvisionalId, Record, RecordId, StagedId, StagingBuffer, UserId,
};

fn record(title: &str) -> Record {
    Record::new(UserId(1), title, "")
}

#[test]
fn durable_id_is_never_both_modified_and_deleted() {
    let mut buffer = StagingBuffer::new();
    let id = RecordId(5);

    buffer.stage_update(id.into(), record("edit")).unwrap();
    assert_eq!(buffer.stage_delete(id.into()), DeleteEffect::Marked);
    assert!(buffer.is_deleted(id));
    assert!(buffer.modified_record(id).is_none());

    buffer.stage_update(id.into(), record("again")).unwrap();
    assert!(!buffer.is_deleted(id));
    assert_eq!(buffer.modified_count(), 1);
    assert_eq!(buffer.deleted_count(), 0);
}

#[test]
fn new_records_never_carry_durable_ids() {
    let mut buffer = StagingBuffer::new();
    let mut incoming = record("copied");
    incoming.id = Some(RecordId(3));
    let provisional = buffer.stage_new(incoming);

    let mut replacement = record("edited");
    replacement.id = Some(RecordId(4));
    buffer
        .stage_update(StagedId::Provisional(provisional), replacement)
        .unwrap();

    let staged = buffer.new_record(provisional).unwrap();
    assert_eq!(staged.id, None);
    assert_eq!(staged.title, "edited");
    assert_eq!(buffer.modified_count(), 0);
}

#[test]
fn modified_entries_carry_their_key_as_id() {
    let mut buffer = StagingBuffer::new();
    let mut wrong = record("x");
    wrong.id = Some(RecordId(99));
    buffer.stage_update(RecordId(2).into(), wrong).unwrap();

    let (id, staged) = buffer.modified_records().next().unwrap();
    assert_eq!(id, RecordId(2));
    assert_eq!(staged.id, Some(RecordId(2)));
}

#[test]
fn retracting_new_record_leaves_no_trace() {
    let mut buffer = StagingBuffer::new();
    let provisional = buffer.stage_new(record("draft"));
    assert_eq!(buffer.stage_delete(provisional.into()), DeleteEffect::Retracted);

    assert!(buffer.is_empty());
    assert_eq!(buffer.deleted_count(), 0);
    assert_eq!(buffer.stage_delete(provisional.into()), DeleteEffect::Ignored);
}

#[test]
fn deleting_same_durable_id_twice_keeps_one_marker() {
    let mut buffer = StagingBuffer::new();
    buffer.stage_delete(RecordId(1).into());
    buffer.stage_delete(RecordId(1).into());
    assert_eq!(buffer.deleted_ids().collect::<Vec<_>>(), vec![RecordId(1)]);
}

#[test]
fn clear_empties_every_container() {
    let mut buffer = StagingBuffer::new();
    buffer.stage_new(record("a"));
    buffer.stage_update(RecordId(1).into(), record("b")).unwrap();
    buffer.stage_delete(RecordId(2).into());
    assert!(!buffer.is_empty());

    buffer.clear();
    assert!(buffer.is_empty());
    assert_eq!(buffer.new_count() + buffer.modified_count() + buffer.deleted_count(), 0);
}

#[derive(Debug, Clone, Copy)]
enum Op {
    New,
    Update(StagedId),
    Delete(StagedId),
}

const MAX_SEQUENCE: usize = 4;

fn alphabet() -> Vec<Op> {
    let ids = [
        StagedId::Provisional(ProvisionalId(1)),
        StagedId::Provisional(ProvisionalId(2)),
        StagedId::Durable(RecordId(1)),
        StagedId::Durable(RecordId(2)),
    ];
    let mut ops = vec![Op::New];
    ops.extend(ids.iter().map(|id| Op::Update(*id)));
    ops.extend(ids.iter().map(|id| Op::Delete(*id)));
    ops
}

type Contents = (Vec<(ProvisionalId, Record)>, Vec<(RecordId, Record)>, Vec<RecordId>);

fn contents(buffer: &StagingBuffer) -> Contents {
    (
        buffer.new_records().map(|(id, r)| (id, r.clone())).collect(),
        buffer.modified_records().map(|(id, r)| (id, r.clone())).collect(),
        buffer.deleted_ids().collect(),
    )
}

fn apply_and_check(buffer: &mut StagingBuffer, op: Op, step: usize, trail: &[Op]) {
    let before = contents(buffer);
    let highest_before = before.0.iter().map(|(id, _)| *id).max();

    match op {
        Op::New => {
            let id = buffer.stage_new(record(&format!("new {step}")));
            assert!(Some(id) > highest_before, "{trail:?}");
            assert!(buffer.new_record(id).is_some(), "{trail:?}");
        }
        Op::Update(id) => {
            let known = match id {
                StagedId::Provisional(p) => before.0.iter().any(|(staged, _)| *staged == p),
                StagedId::Durable(_) => true,
            };
            let result = buffer.stage_update(id, record(&format!("edit {step}")));
            assert_eq!(result.is_ok(), known, "{trail:?}");
            if !known {
                assert_eq!(contents(buffer), before, "{trail:?}");
            }
            if let StagedId::Durable(durable) = id {
                assert!(buffer.modified_record(durable).is_some(), "{trail:?}");
                assert!(!buffer.is_deleted(durable), "{trail:?}");
            }
        }
        Op::Delete(id) => {
            let effect = buffer.stage_delete(id);
            match id {
                StagedId::Provisional(p) => {
                    let existed = before.0.iter().any(|(staged, _)| *staged == p);
                    let expected = if existed {
                        DeleteEffect::Retracted
                    } else {
                        DeleteEffect::Ignored
                    };
                    assert_eq!(effect, expected, "{trail:?}");
                    assert!(buffer.new_record(p).is_none(), "{trail:?}");
                }
                StagedId::Durable(durable) => {
                    assert_eq!(effect, DeleteEffect::Marked, "{trail:?}");
                    assert!(buffer.is_deleted(durable), "{trail:?}");
                    assert!(buffer.modified_record(durable).is_none(), "{trail:?}");
                }
            }
        }
    }

    for (_, staged) in buffer.new_records() {
        assert_eq!(staged.id, None, "{trail:?}");
    }
    for (id, staged) in buffer.modified_records() {
        assert_eq!(staged.id, Some(id), "{trail:?}");
        assert!(!buffer.is_deleted(id), "{trail:?}");
    }
    assert_eq!(
        buffer.is_empty(),
        buffer.new_count() + buffer.modified_count() + buffer.deleted_count() == 0,
        "{trail:?}"
    );
}

fn explore(buffer: &StagingBuffer, trail: &mut Vec<Op>, ops: &[Op], visited: &mut usize) {
    if trail.len() == MAX_SEQUENCE {
        return;
    }
    for op in ops {
        let mut next = buffer.clone();
        trail.push(*op);
        apply_and_check(&mut next, *op, trail.len(), trail);
        *visited += 1;
        explore(&next, trail, ops, visited);
        trail.pop();
    }
}

#[test]
fn every_short_op_sequence_keeps_buffer_invariants() {
    let ops = alphabet();
    let mut visited = 0;
    explore(&StagingBuffer::new(), &mut Vec::new(), &ops, &mut visited);

    let expected: usize = (1..=MAX_SEQUENCE).map(|len| ops.len().pow(len as u32)).sum();
    assert_eq!(visited, expected);
}
