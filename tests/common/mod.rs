//! Shared fixtures for the integration tests: a small bookstore exposed
//! through root resources, sub-resource methods and locators.

#![allow(dead_code)]

use std::sync::Arc;

use resrouter::dispatcher::{Dispatcher, Reply, Response};
use resrouter::error::HandlerError;
use resrouter::resource::{LocatorSpec, MethodSpec, ParamSpec, ResourceBuilder, ResourceTree};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Book {
    pub id: u32,
    pub title: String,
}

pub struct Library {
    pub books: Vec<Book>,
}

pub struct BookResource {
    pub book: Book,
}

pub struct ChapterResource {
    pub book_id: u32,
    pub number: u32,
}

pub fn library() -> Library {
    Library {
        books: vec![
            Book {
                id: 1,
                title: "Dune".into(),
            },
            Book {
                id: 2,
                title: "Emma".into(),
            },
        ],
    }
}

/// `/books` with a list method, a `POST` consuming JSON, a `latest`
/// sub-resource method and a `{id}` locator leading to [`BookResource`],
/// which in turn locates chapters.
pub fn bookstore_tree() -> Arc<ResourceTree> {
    let tree = Arc::new(ResourceTree::new());
    tree.json::<Book>();
    tree.json::<Vec<Book>>();

    tree.add_singleton(
        ResourceBuilder::at("/books")
            .method(
                MethodSpec::get(|lib: &Library, _| Ok(Reply::entity(lib.books.clone())))
                    .produces(&["application/json"]),
            )
            .method(
                MethodSpec::post(|_: &Library, args| {
                    let book: Book = args.body()?;
                    Ok(Response::status(201)
                        .header("location", format!("/books/{}", book.id))
                        .into())
                })
                .consumes(&["application/json"])
                .param(ParamSpec::body::<Book>()),
            )
            .method(
                MethodSpec::get(|lib: &Library, _| {
                    let last = lib
                        .books
                        .last()
                        .cloned()
                        .ok_or_else(|| HandlerError::with_status(404, "library is empty"))?;
                    Ok(Reply::entity(last))
                })
                .path("latest")
                .produces(&["application/json"]),
            )
            .locator(
                LocatorSpec::new("{id}", |lib: &Library, args| {
                    let id: u32 = args.take("id")?;
                    let book = lib
                        .books
                        .iter()
                        .find(|b| b.id == id)
                        .cloned()
                        .ok_or_else(|| HandlerError::with_status(404, format!("no book {id}")))?;
                    Ok(BookResource { book })
                })
                .param(ParamSpec::path::<u32>("id")),
            ),
        library(),
    )
    .unwrap();

    tree.add_sub_resource(
        ResourceBuilder::<BookResource>::new()
            .method(
                MethodSpec::get(|r: &BookResource, _| Ok(Reply::entity(r.book.clone())))
                    .produces(&["application/json"]),
            )
            .method(
                MethodSpec::get(|r: &BookResource, _| Ok(Reply::entity(r.book.title.clone())))
                    .produces(&["text/plain"]),
            )
            .method(MethodSpec::delete(|_: &BookResource, _| Ok(Reply::NoContent)))
            .locator(
                LocatorSpec::new("chapters/{n:\\d+}", |r: &BookResource, args| {
                    Ok(ChapterResource {
                        book_id: r.book.id,
                        number: args.take("n")?,
                    })
                })
                .param(ParamSpec::path::<u32>("n")),
            ),
    )
    .unwrap();

    tree.add_sub_resource(
        ResourceBuilder::<ChapterResource>::new().method(
            MethodSpec::get(|c: &ChapterResource, args| {
                let lang: String = args.take("lang")?;
                Ok(Reply::entity(format!(
                    "book {} chapter {} ({lang}) via {}",
                    c.book_id,
                    c.number,
                    args.context().matched_uris().join(" > ")
                )))
            })
            .produces(&["text/plain"])
            .param(ParamSpec::query::<String>("lang").default_value("en")),
        ),
    )
    .unwrap();

    tree
}

pub fn bookstore() -> Dispatcher {
    Dispatcher::new(bookstore_tree())
}
