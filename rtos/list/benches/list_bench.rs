//! Hot-path costs of the intrusive lists

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rtos_list::{adapter, DLink, DList, NodeId, SLink, SList};

struct Node {
    key: u32,
    dlink: DLink,
    slink: SLink,
}

adapter!(DNodes = Node { dlink: DLink });
adapter!(SNodes = Node { slink: SLink });

const COUNT: u16 = 32;

fn arena() -> Vec<Node> {
    (0..COUNT as u32)
        .map(|i| Node {
            key: (i * 7) % COUNT as u32,
            dlink: DLink::new(),
            slink: SLink::new(),
        })
        .collect()
}

fn dlist_append_remove(c: &mut Criterion) {
    let mut nodes = arena();
    c.bench_function("dlist append + pop_head", |b| {
        b.iter(|| {
            let mut list: DList<DNodes> = DList::new();
            for i in 0..COUNT {
                list.append(&mut nodes[..], NodeId::new(i));
            }
            while let Some(id) = list.pop_head(&mut nodes[..]) {
                black_box(id);
            }
        })
    });
}

fn dlist_sorted_insert(c: &mut Criterion) {
    let mut nodes = arena();
    c.bench_function("dlist insert_sorted_by_key", |b| {
        b.iter(|| {
            let mut list: DList<DNodes> = DList::new();
            for i in 0..COUNT {
                list.insert_sorted_by_key(&mut nodes[..], NodeId::new(i), |n| n.key);
            }
            list.retain(&mut nodes[..], |_, _| false);
        })
    });
}

fn slist_find_and_remove(c: &mut Criterion) {
    let mut nodes = arena();
    c.bench_function("slist find_and_remove from tail", |b| {
        b.iter(|| {
            let mut list: SList<SNodes> = SList::new();
            for i in 0..COUNT {
                list.append(&mut nodes[..], NodeId::new(i));
            }
            for i in (0..COUNT).rev() {
                black_box(list.find_and_remove(&mut nodes[..], NodeId::new(i)));
            }
        })
    });
}

criterion_group!(benches, dlist_append_remove, dlist_sorted_insert, slist_find_and_remove);
criterion_main!(benches);
