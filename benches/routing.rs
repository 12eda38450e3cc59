use std::hint::black_box;
use std::sync::Arc;

use criterion::{criterion_group, criterion_main, Criterion};
use resrouter::dispatcher::{Dispatcher, Reply, Request};
use resrouter::media::{best_producer, parse_accept, MediaType};
use resrouter::resource::{LocatorSpec, MethodSpec, ParamSpec, ResourceBuilder, ResourceTree};
use resrouter::router::PathMatcher;

const TEMPLATES: &[&str] = &[
    "/",
    "/zoo/animals",
    "/zoo/animals/{id}",
    "/zoo/animals/{id}/toys/{toy_id}",
    "/zoo/{category}/animals/{id}/habitats/{habitat_id}/sections/{section_id}",
    "/inventory/{warehouse_id}/feeds/{feed_id}/items/{item_id}/batches/{batch_id}",
    "/complex/{a}/{b}/{c}/{d}/{e}/{f}/{g}/{h}/{i}",
    "/zoo/health",
    "/orders/{id:\\d+}",
];

const PATHS: &[&str] = &[
    "/zoo/animals/123",
    "/zoo/animals/123/toys/456",
    "/zoo/cats/animals/123/habitats/88/sections/5",
    "/inventory/1/feeds/2/items/3/batches/4",
    "/complex/1/2/3/4/5/6/7/8/9",
    "/orders/42",
];

fn bench_template_match(c: &mut Criterion) {
    let mut matchers: Vec<PathMatcher> = TEMPLATES
        .iter()
        .map(|t| PathMatcher::new(t).unwrap())
        .collect();
    matchers.sort();

    c.bench_function("template_compile", |b| {
        b.iter(|| {
            for t in TEMPLATES {
                black_box(PathMatcher::new(black_box(t)).unwrap());
            }
        })
    });

    c.bench_function("template_match_first", |b| {
        b.iter(|| {
            for path in PATHS {
                let hit = matchers.iter().find_map(|m| m.matches(black_box(path)));
                black_box(&hit);
            }
        })
    });
}

fn bench_negotiation(c: &mut Criterion) {
    let declared: Vec<MediaType> = ["application/json", "application/xml", "text/plain"]
        .iter()
        .map(|m| m.parse().unwrap())
        .collect();
    let accept = parse_accept(["text/html;q=0.9, application/xml;q=0.8, */*;q=0.1"]).unwrap();
    c.bench_function("best_producer", |b| {
        b.iter(|| black_box(best_producer(black_box(&declared), black_box(&accept))))
    });
}

struct Zoo;

struct Animal {
    id: u64,
}

fn zoo_tree() -> Arc<ResourceTree> {
    let tree = Arc::new(ResourceTree::new());
    tree.add_singleton(
        ResourceBuilder::at("/zoo")
            .method(MethodSpec::get(|_: &Zoo, _| Ok(Reply::entity("zoo".to_string()))))
            .method(
                MethodSpec::get(|_: &Zoo, args| {
                    let id: u64 = args.take("id")?;
                    Ok(Reply::entity(format!("animal {id}")))
                })
                .path("animals/{id:\\d+}")
                .produces(&["text/plain"])
                .param(ParamSpec::path::<u64>("id")),
            )
            .locator(
                LocatorSpec::new("pens/{id}", |_: &Zoo, args| {
                    Ok(Animal {
                        id: args.take("id")?,
                    })
                })
                .param(ParamSpec::path::<u64>("id")),
            ),
        Zoo,
    )
    .unwrap();
    tree.add_sub_resource(
        ResourceBuilder::<Animal>::new().method(
            MethodSpec::get(|a: &Animal, _| Ok(Reply::entity(format!("pen {}", a.id))))
                .path("feed")
                .produces(&["text/plain"]),
        ),
    )
    .unwrap();
    tree
}

fn bench_dispatch(c: &mut Criterion) {
    let dispatcher = Dispatcher::new(zoo_tree());

    c.bench_function("dispatch_sub_resource_method", |b| {
        b.iter(|| {
            let response = dispatcher.handle(Request::new("GET", black_box("/zoo/animals/17")));
            black_box(response.status)
        })
    });

    c.bench_function("dispatch_locator_chain", |b| {
        b.iter(|| {
            let response = dispatcher.handle(
                Request::new("GET", black_box("/zoo/pens/3/feed")).header("accept", "text/*"),
            );
            black_box(response.status)
        })
    });

    c.bench_function("dispatch_not_found", |b| {
        b.iter(|| {
            let response = dispatcher.handle(Request::new("GET", black_box("/aquarium/1")));
            black_box(response.status)
        })
    });
}

criterion_group!(benches, bench_template_match, bench_negotiation, bench_dispatch);
criterion_main!(benches);
