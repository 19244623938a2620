fn main() {
    pitstopper_lib::run()
}
