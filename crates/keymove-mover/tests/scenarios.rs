use keymove_core::{Direction, ElementKind, Key, KeyCombo, NodeId, PortKind, Rect, SurfaceId, Vec2};
use keymove_events::{ClickOutcome, Event, EventBus};
use keymove_graph::{ConnectionHighlighter, CursorTarget, NodeTemplate, Surface, Workspace};
use keymove_mover::{
    ClickResolution, ClickTarget, KeyOutcome, MoveKeymap, MoveOutcome, MoveRequest, Mover,
    MoverSettings, PointerEvent, ShortcutRegistry, StickyController,
};
use proptest::prelude::*;
use std::cell::Cell;
use std::rc::Rc;

const SURFACE: SurfaceId = SurfaceId(7);

fn mover() -> Mover {
    Mover::new(EventBus::new(), ShortcutRegistry::new(), MoverSettings::default())
}

fn sticky(settings: MoverSettings) -> (StickyController, EventBus) {
    let bus = EventBus::new();
    let mover = Mover::new(bus.clone(), ShortcutRegistry::new(), settings);
    (StickyController::new(mover), bus)
}

fn port(ws: &Workspace, node: NodeId, kind: PortKind) -> keymove_core::PortId {
    ws.first_port(node, kind).expect("port exists")
}

/// `top` with `below` hanging from its next port.
fn attached_pair() -> anyhow::Result<(Workspace, NodeId, NodeId)> {
    let mut ws = Workspace::new(SURFACE);
    let top = ws.add_statement("top", Vec2::new(40.0, 40.0));
    let below = ws.add_statement("below", Vec2::ZERO);
    ws.link_ports(port(&ws, top, PortKind::Next), port(&ws, below, PortKind::Previous))?;
    Ok((ws, top, below))
}

fn highlight_center(controller: &StickyController, ws: &Workspace, index: usize) -> Vec2 {
    let highlighter = controller.highlighter(SURFACE).expect("highlighter exists");
    let spec = &highlighter.highlights()[index].spec;
    ConnectionHighlighter::screen_rect(ws, spec)
        .expect("highlight is anchored")
        .center()
}

#[test]
fn simple_reattach_has_zero_net_delta() -> anyhow::Result<()> {
    let (mut ws, top, below) = attached_pair()?;
    let before = ws.position_of(below);
    let mut mover = mover();

    assert!(mover.start(&mut ws, MoveRequest::existing(below)));
    assert_eq!(mover.session(SURFACE).map(|s| s.total_delta), Some(Vec2::ZERO));
    assert!(mover.finish(&mut ws));

    assert_eq!(ws.parent_of(below), Some(top));
    assert_eq!(ws.position_of(below), before);
    Ok(())
}

#[test]
fn abort_restores_attachment_and_position() -> anyhow::Result<()> {
    let (mut ws, top, below) = attached_pair()?;
    let attachment = ws.attachment(below);
    let before = ws.position_of(below);
    let mut mover = mover();

    mover.start(&mut ws, MoveRequest::existing(below));
    mover.move_unconstrained(&mut ws, Direction::Down)?;
    mover.move_unconstrained(&mut ws, Direction::Left)?;
    assert!(mover.abort(&mut ws));

    assert_eq!(ws.attachment(below), attachment);
    assert_eq!(ws.position_of(below), before);
    assert_eq!(ws.parent_of(below), Some(top));
    Ok(())
}

#[test]
fn insertion_abort_deletes_and_leaves_cursor_on_last_neighbour() -> anyhow::Result<()> {
    let mut ws = Workspace::new(SURFACE);
    let first = ws.add_statement("first", Vec2::ZERO);
    let second = ws.add_statement("second", Vec2::new(0.0, 200.0));
    let fresh = ws.materialize(&NodeTemplate::statement("fresh"), Vec2::new(300.0, 100.0))?;
    let mut mover = mover();

    mover.start(&mut ws, MoveRequest::insertion(fresh));
    mover.move_constrained(&mut ws, Direction::Down)?;
    let considered = mover.candidate(SURFACE).map(|c| c.neighbour);
    assert!(considered.is_some());
    assert!(mover.abort(&mut ws));

    assert!(!ws.contains(fresh));
    assert!(ws.contains(first) && ws.contains(second));
    assert_eq!(ws.cursor(), considered.map(CursorTarget::Port));
    Ok(())
}

#[test]
fn teardown_is_idempotent_and_callback_fires_once() -> anyhow::Result<()> {
    let (mut ws, _, below) = attached_pair()?;
    let mut mover = mover();
    let calls = Rc::new(Cell::new(0));

    for abort in [false, true] {
        let counter = calls.clone();
        mover.start(
            &mut ws,
            MoveRequest::existing(below).on_done(move |_| counter.set(counter.get() + 1)),
        );
        if abort {
            assert!(mover.abort(&mut ws));
            assert!(!mover.abort(&mut ws));
            assert!(!mover.finish(&mut ws));
        } else {
            assert!(mover.finish(&mut ws));
            assert!(!mover.finish(&mut ws));
            assert!(!mover.abort(&mut ws));
        }
    }
    assert_eq!(calls.get(), 2);
    Ok(())
}

#[test]
fn completion_reports_outcome() -> anyhow::Result<()> {
    let (mut ws, _, below) = attached_pair()?;
    let mut mover = mover();
    let seen = Rc::new(Cell::new(None));
    let sink = seen.clone();
    mover.start(
        &mut ws,
        MoveRequest::existing(below).on_done(move |outcome| sink.set(Some(outcome))),
    );
    mover.abort(&mut ws);
    assert_eq!(seen.get(), Some(MoveOutcome::Aborted));
    Ok(())
}

#[test]
fn keyboard_traversal_visits_every_port_once() -> anyhow::Result<()> {
    let mut ws = Workspace::new(SURFACE);
    let count = 4;
    for i in 0..count {
        ws.add_statement(format!("s{i}"), Vec2::new(0.0, i as f32 * 100.0));
    }
    let moving = ws.add_statement("moving", Vec2::new(400.0, 0.0));
    let mut mover = mover();
    mover.start(&mut ws, MoveRequest::existing(moving));

    let mut visited = Vec::new();
    for _ in 0..count * 2 {
        mover.move_constrained(&mut ws, Direction::Down)?;
        visited.push(mover.candidate(SURFACE).expect("candidate").neighbour);
    }
    let mut unique = visited.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), count * 2);

    mover.move_constrained(&mut ws, Direction::Down)?;
    assert_eq!(mover.candidate(SURFACE).map(|c| c.neighbour), Some(visited[0]));
    mover.move_constrained(&mut ws, Direction::Up)?;
    assert_eq!(
        mover.candidate(SURFACE).map(|c| c.neighbour),
        visited.last().copied()
    );
    Ok(())
}

#[test]
fn highlight_set_is_capped_at_fifty() {
    let mut ws = Workspace::new(SURFACE);
    for i in 0..60 {
        ws.add_statement(format!("s{i}"), Vec2::new((i % 6) as f32 * 150.0, (i / 6) as f32 * 80.0));
    }
    let moving = ws.add_statement("moving", Vec2::new(2000.0, 0.0));
    let (mut controller, _) = sticky(MoverSettings::default());

    assert!(controller.enter(&mut ws, moving, Vec2::new(2000.0, 0.0)));
    let highlighter = controller.highlighter(SURFACE).expect("highlighter exists");
    assert_eq!(highlighter.len(), 50);
    assert_eq!(ws.overlays().len(), 50);
}

#[test]
fn clicking_a_highlight_connects_and_closes_session() -> anyhow::Result<()> {
    let mut ws = Workspace::new(SURFACE);
    let holder = ws.add_node(ElementKind::Block, "print", Vec2::ZERO, Vec2::new(120.0, 40.0));
    let input = ws.add_port(holder, PortKind::Input, Vec2::new(80.0, 20.0));
    let value = ws.add_value("value", Vec2::new(300.0, 300.0));
    let (mut controller, bus) = sticky(MoverSettings {
        follow_pointer: false,
        ..MoverSettings::default()
    });

    assert!(controller.enter(&mut ws, value, Vec2::new(305.0, 305.0)));
    assert_eq!(controller.highlighter(SURFACE).map(|h| h.neighbours()), Some(vec![input]));
    let click = highlight_center(&controller, &ws, 0);

    let resolution = controller.on_click(&mut ws, PointerEvent::new(click, ClickTarget::Background));
    assert_eq!(resolution, ClickResolution::Connected);
    assert_eq!(ws.parent_of(value), Some(holder));
    assert_eq!(ws.attachment(value), Some((port(&ws, value, PortKind::Output), input)));
    assert!(!controller.mover().is_moving(SURFACE));

    let events = bus.drain();
    assert!(events.iter().any(|e| matches!(e, Event::HighlightActivated { port, .. } if *port == input)));
    assert!(events.iter().any(|e| matches!(
        e,
        Event::StickyResolved { outcome: ClickOutcome::Connected, .. }
    )));
    Ok(())
}

#[test]
fn sticky_drop_on_trash_deletes_node_and_heals_stack() -> anyhow::Result<()> {
    let mut ws = Workspace::new(SURFACE);
    let top = ws.add_statement("top", Vec2::ZERO);
    let middle = ws.add_statement("middle", Vec2::ZERO);
    let bottom = ws.add_statement("bottom", Vec2::ZERO);
    ws.link_ports(port(&ws, top, PortKind::Next), port(&ws, middle, PortKind::Previous))?;
    ws.link_ports(port(&ws, middle, PortKind::Next), port(&ws, bottom, PortKind::Previous))?;
    ws.set_trash(Some(Rect::from_pos_size(Vec2::new(700.0, 500.0), Vec2::new(80.0, 80.0))));
    let (mut controller, _) = sticky(MoverSettings::default());

    assert!(controller.enter(&mut ws, middle, Vec2::new(20.0, 60.0)));
    let resolution = controller.on_click(
        &mut ws,
        PointerEvent::new(Vec2::new(740.0, 540.0), ClickTarget::Background),
    );

    assert_eq!(resolution, ClickResolution::Deleted);
    assert!(!ws.contains(middle));
    assert!(ws.contains(bottom));
    assert_eq!(ws.parent_of(bottom), Some(top));
    assert!(!controller.mover().is_moving(SURFACE));
    Ok(())
}

#[test]
fn trash_click_on_undeletable_node_resolves_as_ordinary_drop() -> anyhow::Result<()> {
    let mut ws = Workspace::new(SURFACE);
    let top = ws.add_statement("top", Vec2::ZERO);
    let middle = ws.add_statement("middle", Vec2::ZERO);
    let bottom = ws.add_statement("bottom", Vec2::ZERO);
    ws.link_ports(port(&ws, top, PortKind::Next), port(&ws, middle, PortKind::Previous))?;
    ws.link_ports(port(&ws, middle, PortKind::Next), port(&ws, bottom, PortKind::Previous))?;
    ws.set_deletable(middle, false);
    ws.set_trash(Some(Rect::from_pos_size(Vec2::new(700.0, 500.0), Vec2::new(80.0, 80.0))));
    let (mut controller, bus) = sticky(MoverSettings::default());

    assert!(controller.enter(&mut ws, middle, Vec2::new(20.0, 60.0)));
    let resolution = controller.on_click(
        &mut ws,
        PointerEvent::new(Vec2::new(740.0, 540.0), ClickTarget::Background),
    );

    // The live candidate is still the original attachment.
    assert_eq!(resolution, ClickResolution::Connected);
    assert!(ws.contains(middle));
    assert_eq!(ws.element_count(), 3);
    assert_eq!(ws.parent_of(middle), Some(top));
    assert_eq!(ws.parent_of(bottom), Some(middle));
    assert!(!controller.mover().is_moving(SURFACE));
    assert!(!bus.drain().iter().any(|e| matches!(
        e,
        Event::StickyResolved { outcome: ClickOutcome::Deleted, .. }
    )));
    Ok(())
}

#[test]
fn trash_keeps_tail_of_a_free_stack() -> anyhow::Result<()> {
    let mut ws = Workspace::new(SURFACE);
    let head = ws.add_statement("head", Vec2::ZERO);
    let tail = ws.add_statement("tail", Vec2::ZERO);
    ws.link_ports(port(&ws, head, PortKind::Next), port(&ws, tail, PortKind::Previous))?;
    ws.set_trash(Some(Rect::from_pos_size(Vec2::new(700.0, 500.0), Vec2::new(80.0, 80.0))));
    let (mut controller, _) = sticky(MoverSettings::default());

    controller.enter(&mut ws, head, Vec2::new(10.0, 10.0));
    controller.on_click(
        &mut ws,
        PointerEvent::new(Vec2::new(720.0, 520.0), ClickTarget::Background),
    );
    assert!(!ws.contains(head));
    assert!(ws.contains(tail));
    assert_eq!(ws.parent_of(tail), None);
    Ok(())
}

#[test]
fn palette_insertion_through_highlight() -> anyhow::Result<()> {
    let mut ws = Workspace::new(SURFACE);
    let target = ws.add_statement("target", Vec2::ZERO);
    let (mut controller, bus) = sticky(MoverSettings::default());

    let resolution = controller.on_click(
        &mut ws,
        PointerEvent::new(
            Vec2::new(400.0, 300.0),
            ClickTarget::Palette(NodeTemplate::statement("new")),
        ),
    );
    assert_eq!(resolution, ClickResolution::PendingShown);
    assert_eq!(ws.element_count(), 1);

    let next = port(&ws, target, PortKind::Next);
    let index = controller
        .highlighter(SURFACE)
        .and_then(|h| h.neighbours().iter().position(|p| *p == next))
        .expect("next port is highlighted");
    let click = highlight_center(&controller, &ws, index);
    let resolution =
        controller.on_click(&mut ws, PointerEvent::new(click, ClickTarget::Background));

    assert_eq!(resolution, ClickResolution::Inserted);
    assert_eq!(ws.element_count(), 2);
    assert!(controller.pending_insertion(SURFACE).is_none());
    let inserted = ws
        .elements()
        .map(|e| e.id)
        .find(|id| *id != target)
        .expect("inserted node");
    assert_eq!(ws.parent_of(inserted), Some(target));
    assert!(bus.drain().iter().any(|e| matches!(
        e,
        Event::StickyResolved { outcome: ClickOutcome::Inserted, .. }
    )));
    Ok(())
}

#[test]
fn deferred_render_runs_on_next_frame() -> anyhow::Result<()> {
    let (mut ws, top, below) = attached_pair()?;
    let bus = EventBus::new();
    let mut mover = Mover::new(bus.clone(), ShortcutRegistry::new(), MoverSettings::default());
    mover.start(&mut ws, MoveRequest::existing(below));
    mover.finish(&mut ws);
    assert!(mover.has_pending_render(SURFACE));
    assert!(ws.log().renders.is_empty());

    assert_eq!(mover.on_frame(&mut ws), 1);
    assert_eq!(ws.log().renders, vec![top]);
    assert_eq!(ws.log().full_renders, 1);
    assert_eq!(ws.focused(), Some(below));
    assert!(bus.drain().iter().any(|e| matches!(e, Event::RenderPassCompleted { node, .. } if *node == below)));
    Ok(())
}

#[test]
fn keymap_drives_a_full_keyboard_move() -> anyhow::Result<()> {
    let (mut ws, top, below) = attached_pair()?;
    let other = ws.add_statement("other", Vec2::new(0.0, 300.0));
    let registry = ShortcutRegistry::new();
    let keymap = MoveKeymap::new(registry.clone())?;
    let mut controller = StickyController::new(Mover::new(
        EventBus::new(),
        registry,
        MoverSettings::default(),
    ));

    let press = |controller: &mut StickyController, ws: &mut Workspace, key: Key| {
        keymap.handle_key(controller, ws, KeyCombo::new(key), Some(below))
    };
    assert!(matches!(press(&mut controller, &mut ws, Key::Char('m')), KeyOutcome::Handled(_)));
    press(&mut controller, &mut ws, Key::Down);
    press(&mut controller, &mut ws, Key::Enter);

    assert_eq!(ws.parent_of(other), Some(below));
    assert_eq!(ws.parent_of(below), None);
    assert!(ws.contains(top));
    Ok(())
}

#[derive(Debug, Clone)]
enum Op {
    Start(usize),
    Finish,
    Abort,
    Step(Direction),
    Nudge(Direction),
}

fn op() -> impl Strategy<Value = Op> {
    let direction = prop_oneof![
        Just(Direction::Up),
        Just(Direction::Down),
        Just(Direction::Left),
        Just(Direction::Right),
    ];
    prop_oneof![
        (0usize..3).prop_map(Op::Start),
        Just(Op::Finish),
        Just(Op::Abort),
        direction.clone().prop_map(Op::Step),
        direction.prop_map(Op::Nudge),
    ]
}

proptest! {
    #[test]
    fn at_most_one_session_per_surface(ops in prop::collection::vec(op(), 1..40)) {
        let mut ws = Workspace::new(SURFACE);
        let nodes: Vec<NodeId> = (0..3)
            .map(|i| ws.add_statement(format!("n{i}"), Vec2::new(0.0, i as f32 * 120.0)))
            .collect();
        let bus = EventBus::new();
        let mut mover = Mover::new(bus.clone(), ShortcutRegistry::new(), MoverSettings::default());
        let mut open: i32 = 0;

        for op in ops {
            match op {
                Op::Start(i) => {
                    mover.start(&mut ws, MoveRequest::existing(nodes[i]));
                }
                Op::Finish => {
                    mover.finish(&mut ws);
                }
                Op::Abort => {
                    mover.abort(&mut ws);
                }
                Op::Step(d) => {
                    let result = mover.move_constrained(&mut ws, d);
                    prop_assert_eq!(result.is_ok(), mover.is_moving(SURFACE));
                }
                Op::Nudge(d) => {
                    let result = mover.move_unconstrained(&mut ws, d);
                    prop_assert_eq!(result.is_ok(), mover.is_moving(SURFACE));
                }
            }
            for event in bus.drain() {
                match event {
                    Event::MoveStarted { .. } => open += 1,
                    Event::MoveFinished { .. } | Event::MoveAborted { .. } => open -= 1,
                    _ => {}
                }
                prop_assert!((0..=1).contains(&open));
            }
            prop_assert_eq!(open == 1, mover.is_moving(SURFACE));
        }
    }
}
