mod logging;
mod settings;

use std::process;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use estate_client::resource::Resource;
use estate_client::{
    Booking, BookingDraft, ChatMessage, ChatStore, Comment, CommentDraft, Credentials,
    EstateClient, EstateClientError, FetchOutcome, FileStorage, ListingType, Post, PostDraft,
    Property, PropertyDraft, PropertyPatch, PropertyStatus, PropertyType, ResourceStore, Review,
    ReviewDraft, SignupRequest, Story, StoryDraft, User,
};
use serde::de::DeserializeOwned;

use crate::logging::init_logging;
use crate::settings::Settings;

const LOCAL_DIR: &str = "local";
const SESSION_DIR: &str = "session";

#[derive(Debug, Parser)]
#[command(
    name = "estate-cli",
    version,
    about = "CLI клиент для API маркетплейса недвижимости"
)]
struct Cli {
    /// Адрес API (перекрывает ESTATE_API_URL).
    #[arg(long, global = true)]
    server: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Вход пользователя.
    Login {
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
    },
    /// Регистрация пользователя.
    Signup {
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        full_name: Option<String>,
    },
    /// Выход: удаляет сохранённую сессию.
    Logout,
    /// Текущий пользователь.
    Whoami,
    /// Лента постов.
    #[command(subcommand)]
    Posts(PostsCommand),
    /// Истории.
    #[command(subcommand)]
    Stories(StoriesCommand),
    /// Объявления.
    #[command(subcommand)]
    Properties(PropertiesCommand),
    /// Бронирования (требует токен).
    #[command(subcommand)]
    Bookings(BookingsCommand),
    /// Отзывы об объявлении.
    #[command(subcommand)]
    Reviews(ReviewsCommand),
    /// AI-ассистент (требует токен).
    #[command(subcommand)]
    Chat(ChatCommand),
}

#[derive(Debug, Args)]
struct ListArgs {
    /// Сколько страниц загрузить, следуя курсору.
    #[arg(long, default_value_t = 1)]
    pages: u32,
    /// Игнорировать кэш первой страницы.
    #[arg(long)]
    refresh: bool,
}

#[derive(Debug, Subcommand)]
enum PostsCommand {
    /// Список постов.
    List(ListArgs),
    /// Пост по id.
    Show {
        #[arg(long)]
        id: String,
    },
    /// Создание поста (требует токен).
    Create {
        #[arg(long)]
        content: String,
        /// URL изображения; можно указать несколько раз.
        #[arg(long = "image")]
        images: Vec<String>,
        #[arg(long)]
        location: Option<String>,
        #[arg(long)]
        property: Option<String>,
    },
    /// Лайк (требует токен).
    Like {
        #[arg(long)]
        id: String,
    },
    /// Снять лайк (требует токен).
    Unlike {
        #[arg(long)]
        id: String,
    },
    /// Удаление поста (требует токен).
    Delete {
        #[arg(long)]
        id: String,
    },
    /// Комментарий к посту (требует токен).
    Comment {
        #[arg(long)]
        id: String,
        #[arg(long)]
        text: String,
    },
    /// Ответ на комментарий (требует токен).
    Reply {
        #[arg(long)]
        post: String,
        #[arg(long)]
        comment: String,
        #[arg(long)]
        text: String,
    },
    /// Комментарии к посту.
    Comments {
        #[arg(long)]
        id: String,
    },
}

#[derive(Debug, Subcommand)]
enum StoriesCommand {
    /// Список историй.
    List(ListArgs),
    /// Создание истории (требует токен).
    Create {
        #[arg(long)]
        media_url: String,
        #[arg(long)]
        caption: Option<String>,
    },
    /// Отметить просмотр.
    View {
        #[arg(long)]
        id: String,
    },
}

#[derive(Debug, Subcommand)]
enum PropertiesCommand {
    /// Список объявлений.
    List {
        #[command(flatten)]
        list: ListArgs,
        #[arg(long)]
        city: Option<String>,
        /// sale или rent.
        #[arg(long, value_parser = parse_choice::<ListingType>)]
        listing: Option<ListingType>,
    },
    /// Объявление по id.
    Show {
        #[arg(long)]
        id: String,
    },
    /// Создание объявления (требует токен).
    Create {
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        description: String,
        /// house, apartment, land или commercial.
        #[arg(long = "type", value_parser = parse_choice::<PropertyType>)]
        property_type: PropertyType,
        /// sale или rent.
        #[arg(long, value_parser = parse_choice::<ListingType>)]
        listing: ListingType,
        #[arg(long)]
        price: f64,
        #[arg(long, default_value = "USD")]
        currency: String,
        #[arg(long)]
        city: String,
        #[arg(long, default_value = "")]
        address: String,
        #[arg(long)]
        bedrooms: Option<u32>,
        #[arg(long)]
        bathrooms: Option<u32>,
        #[arg(long)]
        area: Option<f64>,
    },
    /// Изменение объявления (требует токен).
    Update {
        #[arg(long)]
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        price: Option<f64>,
        /// available, pending, sold или rented.
        #[arg(long, value_parser = parse_choice::<PropertyStatus>)]
        status: Option<PropertyStatus>,
    },
    /// Отметить просмотр.
    View {
        #[arg(long)]
        id: String,
    },
}

#[derive(Debug, Subcommand)]
enum BookingsCommand {
    /// Мои бронирования.
    List(ListArgs),
    /// Бронирование объявления.
    Create {
        #[arg(long)]
        property: String,
        /// Дата заезда, YYYY-MM-DD.
        #[arg(long)]
        check_in: NaiveDate,
        /// Дата выезда, YYYY-MM-DD.
        #[arg(long)]
        check_out: NaiveDate,
        #[arg(long, default_value_t = 1)]
        guests: u32,
        #[arg(long)]
        message: Option<String>,
    },
    /// Отмена бронирования.
    Cancel {
        #[arg(long)]
        id: String,
    },
}

#[derive(Debug, Subcommand)]
enum ReviewsCommand {
    /// Отзывы об объявлении.
    List {
        #[arg(long)]
        property: String,
        #[command(flatten)]
        list: ListArgs,
    },
    /// Новый отзыв (требует токен).
    Create {
        #[arg(long)]
        property: String,
        #[arg(long)]
        rating: u8,
        #[arg(long)]
        comment: String,
    },
}

#[derive(Debug, Subcommand)]
enum ChatCommand {
    /// Отправить сообщение ассистенту.
    Send {
        /// Продолжить существующий диалог.
        #[arg(long)]
        conversation: Option<String>,
        text: String,
    },
    /// История диалога.
    History {
        #[arg(long)]
        conversation: String,
    },
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("Ошибка: {err}");
        process::exit(1);
    }
}

async fn run() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let settings = Settings::from_env().context("не удалось прочитать настройки")?;
    init_logging(&settings)?;

    let client = build_client(&settings, cli.server)?;

    match cli.command {
        Command::Login { username, password } => {
            let user = client
                .login(&Credentials { username, password })
                .await
                .map_err(map_client_error)?;
            print_user("Вход выполнен", &user);
        }
        Command::Signup {
            username,
            email,
            password,
            full_name,
        } => {
            let request = SignupRequest {
                username,
                email,
                password,
                full_name,
            };
            let user = client.signup(&request).await.map_err(map_client_error)?;
            print_user("Регистрация успешна", &user);
        }
        Command::Logout => {
            client.logout();
            println!("Выход выполнен");
        }
        Command::Whoami => {
            let user = client.whoami().await.map_err(map_client_error)?;
            print_user("Текущий пользователь", &user);
        }
        Command::Posts(command) => run_posts(&client, command).await?,
        Command::Stories(command) => run_stories(&client, command).await?,
        Command::Properties(command) => run_properties(&client, command).await?,
        Command::Bookings(command) => run_bookings(&client, command).await?,
        Command::Reviews(command) => run_reviews(&client, command).await?,
        Command::Chat(command) => run_chat(&client, command).await?,
    }

    Ok(())
}

fn build_client(settings: &Settings, server: Option<String>) -> Result<EstateClient> {
    let local = FileStorage::open(settings.state_dir.join(LOCAL_DIR))
        .map_err(map_client_error)
        .context("не удалось открыть хранилище сессии")?;
    let session = FileStorage::open(settings.state_dir.join(SESSION_DIR))
        .map_err(map_client_error)
        .context("не удалось открыть кэш")?;

    EstateClient::new(
        &settings.client_config(server),
        Arc::new(local),
        Arc::new(session),
    )
    .map_err(map_client_error)
}

async fn run_posts(client: &EstateClient, command: PostsCommand) -> Result<()> {
    let posts = client.posts();
    match command {
        PostsCommand::List(args) => {
            let outcome = load_pages(&posts, &args).await?;
            print_posts(&posts.items(), outcome, posts.has_more());
        }
        PostsCommand::Show { id } => {
            let post = posts.fetch_one(&id).await.map_err(map_client_error)?;
            print_post("Пост", &post);
        }
        PostsCommand::Create {
            content,
            images,
            location,
            property,
        } => {
            let draft = PostDraft {
                content,
                images,
                location,
                property_id: property,
            };
            let post = posts.create(draft).await.map_err(map_client_error)?;
            print_post("Пост создан", &post);
        }
        PostsCommand::Like { id } => {
            let like = posts.like(&id).await.map_err(map_client_error)?;
            println!("Лайк поставлен: id={id}, likes={}", like.likes_count);
        }
        PostsCommand::Unlike { id } => {
            let like = posts.unlike(&id).await.map_err(map_client_error)?;
            println!("Лайк снят: id={id}, likes={}", like.likes_count);
        }
        PostsCommand::Delete { id } => {
            posts.delete(&id).await.map_err(map_client_error)?;
            println!("Пост удалён: id={id}");
        }
        PostsCommand::Comment { id, text } => {
            let comment = posts
                .create_comment(&id, &CommentDraft { content: text })
                .await
                .map_err(map_client_error)?;
            println!("Комментарий добавлен");
            print_comment(&comment, 0);
        }
        PostsCommand::Reply {
            post,
            comment,
            text,
        } => {
            let reply = posts
                .reply_to_comment(&post, &comment, &CommentDraft { content: text })
                .await
                .map_err(map_client_error)?;
            println!("Ответ добавлен");
            print_comment(&reply, 0);
        }
        PostsCommand::Comments { id } => {
            let page = posts.fetch_comments(&id).await.map_err(map_client_error)?;
            println!("Комментариев: {}", page.count.unwrap_or(page.results.len() as u64));
            for comment in &page.results {
                print_comment(comment, 0);
            }
        }
    }
    Ok(())
}

async fn run_stories(client: &EstateClient, command: StoriesCommand) -> Result<()> {
    let stories = client.stories();
    match command {
        StoriesCommand::List(args) => {
            let outcome = load_pages(&stories, &args).await?;
            print_stories(&stories.items(), outcome, stories.has_more());
        }
        StoriesCommand::Create { media_url, caption } => {
            let story = stories
                .create(StoryDraft { media_url, caption })
                .await
                .map_err(map_client_error)?;
            println!("История создана");
            print_story_line(&story);
        }
        StoriesCommand::View { id } => {
            let views = stories.record_view(&id).await.map_err(map_client_error)?;
            println!("Просмотр учтён: id={id}, views={}", views.views_count);
        }
    }
    Ok(())
}

async fn run_properties(client: &EstateClient, command: PropertiesCommand) -> Result<()> {
    match command {
        PropertiesCommand::List {
            list,
            city,
            listing,
        } => {
            let mut properties = client.properties();
            if let Some(city) = city {
                properties = properties.with_filter("city", city);
            }
            if let Some(listing) = listing {
                properties = properties.with_filter("listing_type", choice_name(&listing)?);
            }
            let outcome = load_pages(&properties, &list).await?;
            print_properties(&properties.items(), outcome, properties.has_more());
        }
        PropertiesCommand::Show { id } => {
            let property = client
                .properties()
                .fetch_one(&id)
                .await
                .map_err(map_client_error)?;
            print_property("Объявление", &property);
        }
        PropertiesCommand::Create {
            title,
            description,
            property_type,
            listing,
            price,
            currency,
            city,
            address,
            bedrooms,
            bathrooms,
            area,
        } => {
            let draft = PropertyDraft {
                title,
                description,
                property_type,
                listing_type: listing,
                price,
                currency,
                city,
                address,
                bedrooms,
                bathrooms,
                area_sqm: area,
                images: Vec::new(),
            };
            let property = client
                .properties()
                .create(draft)
                .await
                .map_err(map_client_error)?;
            print_property("Объявление создано", &property);
        }
        PropertiesCommand::Update {
            id,
            title,
            price,
            status,
        } => {
            let patch = PropertyPatch {
                title,
                price,
                status,
                ..PropertyPatch::default()
            };
            let property = client
                .properties()
                .update(&id, &patch)
                .await
                .map_err(map_client_error)?;
            print_property("Объявление обновлено", &property);
        }
        PropertiesCommand::View { id } => {
            let views = client
                .properties()
                .record_view(&id)
                .await
                .map_err(map_client_error)?;
            println!("Просмотр учтён: id={id}, views={}", views.views_count);
        }
    }
    Ok(())
}

async fn run_bookings(client: &EstateClient, command: BookingsCommand) -> Result<()> {
    let bookings = client.bookings();
    match command {
        BookingsCommand::List(args) => {
            let outcome = load_pages(&bookings, &args).await?;
            print_bookings(&bookings.items(), outcome, bookings.has_more());
        }
        BookingsCommand::Create {
            property,
            check_in,
            check_out,
            guests,
            message,
        } => {
            let draft = BookingDraft {
                property_id: property,
                check_in,
                check_out,
                guests,
                message,
            };
            let booking = bookings.create(draft).await.map_err(map_client_error)?;
            println!("Бронирование создано");
            print_booking_line(&booking);
        }
        BookingsCommand::Cancel { id } => {
            let booking = bookings.cancel(&id).await.map_err(map_client_error)?;
            println!("Бронирование отменено");
            print_booking_line(&booking);
        }
    }
    Ok(())
}

async fn run_reviews(client: &EstateClient, command: ReviewsCommand) -> Result<()> {
    match command {
        ReviewsCommand::List { property, list } => {
            let reviews = client.reviews_for(&property);
            let outcome = load_pages(&reviews, &list).await?;
            print_reviews(&reviews.items(), outcome, reviews.has_more());
        }
        ReviewsCommand::Create {
            property,
            rating,
            comment,
        } => {
            let reviews = client.reviews_for(&property);
            let draft = ReviewDraft {
                property_id: property,
                rating,
                comment,
            };
            let review = reviews.create(draft).await.map_err(map_client_error)?;
            println!("Отзыв добавлен");
            print_review_line(&review);
        }
    }
    Ok(())
}

async fn run_chat(client: &EstateClient, command: ChatCommand) -> Result<()> {
    match command {
        ChatCommand::Send { conversation, text } => {
            let chat = match conversation {
                Some(id) => client.resume_chat(&id),
                None => client.chat(),
            };
            let reply = chat.send(&text).await.map_err(map_client_error)?;
            print_chat_message(&reply);
            print_conversation_hint(&chat);
        }
        ChatCommand::History { conversation } => {
            let chat = client.resume_chat(&conversation);
            let history = chat.load_history().await.map_err(map_client_error)?;
            println!("Сообщений: {}", history.len());
            for message in &history {
                print_chat_message(message);
            }
        }
    }
    Ok(())
}

/// Первая страница (из кэша или с сервера) и ещё `pages - 1` по курсору.
async fn load_pages<R: Resource>(
    store: &ResourceStore<R>,
    args: &ListArgs,
) -> Result<FetchOutcome> {
    let outcome = if args.refresh {
        store.refresh().await
    } else {
        store.fetch_first_page().await
    }
    .map_err(map_client_error)?;

    for _ in 1..args.pages {
        if !store.has_more() {
            break;
        }
        store.load_more().await.map_err(map_client_error)?;
    }
    Ok(outcome)
}

fn parse_choice<T: DeserializeOwned>(raw: &str) -> Result<T, String> {
    serde_json::from_value(serde_json::Value::String(raw.trim().to_lowercase()))
        .map_err(|_| format!("неизвестное значение: {raw}"))
}

fn choice_name<T: serde::Serialize>(value: &T) -> Result<String> {
    match serde_json::to_value(value).context("не удалось сериализовать фильтр")? {
        serde_json::Value::String(name) => Ok(name),
        other => Ok(other.to_string()),
    }
}

fn map_client_error(err: EstateClientError) -> anyhow::Error {
    let message = match err {
        EstateClientError::AuthRequired => {
            "требуется авторизация: выполните `estate-cli login ...` или `estate-cli signup ...`"
                .to_string()
        }
        EstateClientError::SessionExpired => {
            "сессия истекла: выполните `estate-cli login ...` снова".to_string()
        }
        EstateClientError::NotFound => "ресурс не найден".to_string(),
        EstateClientError::Validation(message) => format!("некорректные данные: {message}"),
        EstateClientError::Api { status, message } => {
            format!("ошибка API (status={status}): {message}")
        }
        EstateClientError::Http(err) => format!("ошибка HTTP: {err}"),
        EstateClientError::Decode(message) => format!("неожиданный ответ сервера: {message}"),
        EstateClientError::Storage(message) => format!("ошибка локального хранилища: {message}"),
        EstateClientError::Busy(id) => format!("операция над {id} уже выполняется"),
        EstateClientError::Cancelled => "запрос отменён".to_string(),
    };
    anyhow::anyhow!(message)
}

fn source_label(outcome: FetchOutcome) -> &'static str {
    match outcome {
        FetchOutcome::Cached => " (из кэша)",
        FetchOutcome::Fetched | FetchOutcome::Skipped => "",
    }
}

fn print_more_hint(has_more: bool) {
    if has_more {
        println!("... есть ещё, используйте --pages");
    }
}

fn print_user(title: &str, user: &User) {
    println!("{title}");
    println!("user:");
    println!("  id: {}", user.id);
    println!("  username: {}", user.username);
    println!("  email: {}", user.email);
    if let Some(full_name) = &user.full_name {
        println!("  full_name: {full_name}");
    }
}

fn print_post(title: &str, post: &Post) {
    println!("{title}");
    println!("id: {}", post.id);
    println!("author: {}", post.author.username);
    println!("content: {}", post.content);
    if let Some(location) = &post.location {
        println!("location: {location}");
    }
    if let Some(property_id) = &post.property_id {
        println!("property_id: {property_id}");
    }
    println!(
        "likes: {}{}",
        post.likes_count,
        if post.is_liked { " (ваш лайк)" } else { "" }
    );
    println!("comments: {}", post.comments_count);
    println!("views: {}", post.views_count);
    println!("created_at: {}", post.created_at);
}

fn print_posts(posts: &[Post], outcome: FetchOutcome, has_more: bool) {
    println!("Постов: {}{}", posts.len(), source_label(outcome));
    for post in posts {
        println!(
            "- [{}] {} (author={}, likes={}, comments={})",
            post.id, post.content, post.author.username, post.likes_count, post.comments_count
        );
    }
    print_more_hint(has_more);
}

fn print_comment(comment: &Comment, depth: usize) {
    let indent = "  ".repeat(depth);
    println!(
        "{indent}- [{}] {}: {}",
        comment.id, comment.author.username, comment.content
    );
    for reply in &comment.replies {
        print_comment(reply, depth + 1);
    }
}

fn print_story_line(story: &Story) {
    println!(
        "- [{}] {} {} (author={}, views={})",
        story.id,
        story.media_url,
        story.caption.as_deref().unwrap_or(""),
        story.author.username,
        story.views_count
    );
}

fn print_stories(stories: &[Story], outcome: FetchOutcome, has_more: bool) {
    println!("Историй: {}{}", stories.len(), source_label(outcome));
    for story in stories {
        print_story_line(story);
    }
    print_more_hint(has_more);
}

fn print_property(title: &str, property: &Property) {
    println!("{title}");
    println!("id: {}", property.id);
    println!("title: {}", property.title);
    println!("type: {:?} / {:?}", property.property_type, property.listing_type);
    println!("status: {:?}", property.status);
    println!("price: {} {}", property.price, property.currency);
    println!("city: {}", property.city);
    if !property.address.is_empty() {
        println!("address: {}", property.address);
    }
    if let Some(bedrooms) = property.bedrooms {
        println!("bedrooms: {bedrooms}");
    }
    if let Some(area) = property.area_sqm {
        println!("area_sqm: {area}");
    }
    println!("owner: {}", property.owner.username);
    println!("views: {}", property.views_count);
}

fn print_properties(properties: &[Property], outcome: FetchOutcome, has_more: bool) {
    println!("Объявлений: {}{}", properties.len(), source_label(outcome));
    for property in properties {
        println!(
            "- [{}] {} ({}, {} {}, {:?})",
            property.id,
            property.title,
            property.city,
            property.price,
            property.currency,
            property.status
        );
    }
    print_more_hint(has_more);
}

fn print_booking_line(booking: &Booking) {
    println!(
        "- [{}] property={} {}..{} guests={} status={:?}",
        booking.id,
        booking.property_id,
        booking.check_in,
        booking.check_out,
        booking.guests,
        booking.status
    );
}

fn print_bookings(bookings: &[Booking], outcome: FetchOutcome, has_more: bool) {
    println!("Бронирований: {}{}", bookings.len(), source_label(outcome));
    for booking in bookings {
        print_booking_line(booking);
    }
    print_more_hint(has_more);
}

fn print_review_line(review: &Review) {
    println!(
        "- [{}] {}/5 {}: {}",
        review.id, review.rating, review.author.username, review.comment
    );
}

fn print_reviews(reviews: &[Review], outcome: FetchOutcome, has_more: bool) {
    println!("Отзывов: {}{}", reviews.len(), source_label(outcome));
    for review in reviews {
        print_review_line(review);
    }
    print_more_hint(has_more);
}

fn print_chat_message(message: &ChatMessage) {
    println!(
        "[{:?}] {}: {}",
        message.role,
        message.created_at.format("%Y-%m-%d %H:%M"),
        message.content
    );
}

fn print_conversation_hint(chat: &ChatStore) {
    if let Some(id) = chat.conversation_id() {
        println!("conversation: {id} (продолжить: --conversation {id})");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_nested_list_flags() {
        let cli = Cli::try_parse_from(["estate-cli", "posts", "list", "--pages", "3", "--refresh"])
            .expect("should parse");
        match cli.command {
            Command::Posts(PostsCommand::List(args)) => {
                assert_eq!(args.pages, 3);
                assert!(args.refresh);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn cli_parses_booking_dates() {
        let cli = Cli::try_parse_from([
            "estate-cli",
            "--server",
            "localhost:8000",
            "bookings",
            "create",
            "--property",
            "12",
            "--check-in",
            "2026-05-10",
            "--check-out",
            "2026-05-14",
        ])
        .expect("should parse");
        assert_eq!(cli.server.as_deref(), Some("localhost:8000"));
        match cli.command {
            Command::Bookings(BookingsCommand::Create {
                check_in, guests, ..
            }) => {
                assert_eq!(check_in, NaiveDate::from_ymd_opt(2026, 5, 10).expect("date"));
                assert_eq!(guests, 1);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn parse_choice_accepts_known_values() {
        let listing: ListingType = parse_choice("Rent").expect("should parse");
        assert_eq!(listing, ListingType::Rent);
        assert!(parse_choice::<ListingType>("lease").is_err());
        assert_eq!(choice_name(&listing).expect("name"), "rent");
    }

    #[test]
    fn cli_rejects_unknown_listing_type() {
        let result = Cli::try_parse_from([
            "estate-cli",
            "properties",
            "list",
            "--listing",
            "lease",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn map_client_error_hints_login() {
        let message = map_client_error(EstateClientError::AuthRequired).to_string();
        assert!(message.contains("estate-cli login"));

        let message = map_client_error(EstateClientError::Api {
            status: 409,
            message: "Dates are taken".to_string(),
        })
        .to_string();
        assert_eq!(message, "ошибка API (status=409): Dates are taken");
    }
}
